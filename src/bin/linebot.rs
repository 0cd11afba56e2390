#![no_main]
#![no_std]

use cortex_m as cm;

use embedded_hal::adc::OneShot;
use embedded_hal::digital::v2::OutputPin;
use embedded_hal::serial::Read;

use panic_rtt_target as _;
use rtt_target::{rprintln, rtt_init_print};

use rtfm::app;
use rtfm::cyccnt::U32Ext;
use rtfm::Mutex;

use hal::adc;
use hal::gpio;
use hal::gpio::{Alternate, Analog, Floating, Input, Output, PushPull};
use hal::prelude::*;
use hal::pwm::{Pwm, C1, C2, C3, C4};
use hal::rcc::Clocks;
use hal::serial::{Config, Event, Serial};
use hal::stm32;
use hal::stm32::{TIM4, USART1, USART2};
use hal::timer::Timer;
use stm32f1xx_hal as hal;

use linebot::hw::adc::Channel;
use linebot::hw::motion::Motion;
use linebot::hw::timer::Tick;
use linebot::hw::uart::Port;
use linebot::sw::comm::{Actions, Baud};
use linebot::sw::config;
use linebot::sw::robot::Robot;
use linebot::sw::state::{Button, Lock, SharedDeviceState};

/* Types */

type SensorLedType = gpio::gpiod::PD9<Output<PushPull>>;
type IotEnableType = gpio::gpioe::PE2<Output<PushPull>>;

type PcSerial = Serial<
    USART1,
    (
        gpio::gpioa::PA9<Alternate<PushPull>>,
        gpio::gpioa::PA10<Input<Floating>>,
    ),
>;

type IotSerial = Serial<
    USART2,
    (
        gpio::gpioa::PA2<Alternate<PushPull>>,
        gpio::gpioa::PA3<Input<Floating>>,
    ),
>;

type Wheels = Motion<Pwm<TIM4, C1>, Pwm<TIM4, C2>, Pwm<TIM4, C3>, Pwm<TIM4, C4>>;

/* structs */

pub struct Sensors {
    left: gpio::gpioc::PC1<Analog>,
    right: gpio::gpiob::PB1<Analog>,
    thumb: gpio::gpioa::PA7<Analog>,
}

/// Main loop view of the shared state: one resource lock per access
struct Shared<M>(M);

impl<M> Lock for Shared<M>
where
    M: Mutex<T = SharedDeviceState<SensorLedType>>,
{
    type Led = SensorLedType;

    fn lock<R, F>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut SharedDeviceState<SensorLedType>) -> R,
    {
        self.0.lock(f)
    }
}

/* cpu sysclk: 8MHz (no external quartz) */

const ADC_PERIOD: u32 = 8_000 * config::ADC_PERIOD_MS; /* 5 msec */
const DEBOUNCE_PERIOD: u32 = 8_000 * config::DEBOUNCE_PERIOD_MS; /* 50 msec */
const DRIVE_PERIOD: u32 = 8_000 * config::DRIVE_PERIOD_MS; /* 100 msec */
const BOOT_PERIOD: u32 = 8_000 * config::BOOT_PERIOD_MS; /* 200 msec */

/* */

#[app(device = stm32f1xx_hal::stm32, peripherals = true, monotonic = rtfm::cyccnt::CYCCNT)]
const APP: () = {
    struct Resources {
        // state shared by handlers and main loop
        dev: SharedDeviceState<SensorLedType>,

        // main loop controller
        robot: Robot<Wheels>,

        // basic hardware resources
        exti: stm32::EXTI,
        clocks: Clocks,

        // analog readings
        adc: adc::Adc<stm32::ADC1>,
        sensors: Sensors,

        // serial links
        pc: PcSerial,
        iot: IotSerial,
        iot_en: IotEnableType,
    }

    #[init(schedule = [adc_tick, debounce_tick, drive_tick, boot_tick])]
    fn init(mut cx: init::Context) -> init::LateResources {
        rtt_init_print!();

        let mut rcc = cx.device.RCC.constrain();

        // configure clocks
        let mut flash = cx.device.FLASH.constrain();
        let clocks = rcc
            .cfgr
            .sysclk(8.mhz())
            .pclk1(8.mhz())
            .adcclk(2.mhz())
            .freeze(&mut flash.acr);

        rprintln!("SYSCLK: {} Hz ...", clocks.sysclk().0);
        rprintln!("ADCCLK: {} Hz ...", clocks.adcclk().0);

        let mut gpioa = cx.device.GPIOA.split(&mut rcc.apb2);
        let mut gpiob = cx.device.GPIOB.split(&mut rcc.apb2);
        let mut gpioc = cx.device.GPIOC.split(&mut rcc.apb2);
        let mut gpiod = cx.device.GPIOD.split(&mut rcc.apb2);
        let mut gpioe = cx.device.GPIOE.split(&mut rcc.apb2);

        let mut afio = cx.device.AFIO.constrain(&mut rcc.apb2);

        /*
         * Wheels: TIM4 PWM
         *
         */

        let c1 = gpiob.pb6.into_alternate_push_pull(&mut gpiob.crl);
        let c2 = gpiob.pb7.into_alternate_push_pull(&mut gpiob.crl);
        let c3 = gpiob.pb8.into_alternate_push_pull(&mut gpiob.crh);
        let c4 = gpiob.pb9.into_alternate_push_pull(&mut gpiob.crh);

        let pwm = Timer::tim4(cx.device.TIM4, &clocks, &mut rcc.apb1).pwm(
            (c1, c2, c3, c4),
            &mut afio.mapr,
            500.hz(),
        );

        let cfg = config::Config::default();
        let wheels = Motion::init(
            (pwm.0, pwm.1),
            (pwm.2, pwm.3),
            cfg.drive.enforce_direction_change_delay,
        );

        /*
         * Line sensors: IR emitter and analog inputs
         *
         */

        let mut led = gpiod.pd9.into_push_pull_output(&mut gpiod.crh);
        led.set_low().ok();

        let sensors = Sensors {
            left: gpioc.pc1.into_analog(&mut gpioc.crl),
            right: gpiob.pb1.into_analog(&mut gpiob.crl),
            thumb: gpioa.pa7.into_analog(&mut gpioa.crl),
        };

        let adc = adc::Adc::adc1(cx.device.ADC1, &mut rcc.apb2, clocks);

        /*
         * Buttons: PD1 and PD3, active low
         *
         */

        gpiod.pd1.into_floating_input(&mut gpiod.crl);
        gpiod.pd3.into_floating_input(&mut gpiod.crl);

        // select PD1 and PD3 as source inputs for lines EXTI1 and EXTI3
        afio.exticr1
            .exticr1()
            .modify(|_, w| unsafe { w.exti1().bits(0b0011).exti3().bits(0b0011) });

        // enable EXTI1 and EXTI3 lines and configure interrupt on falling edge
        cx.device
            .EXTI
            .imr
            .modify(|_, w| w.mr1().set_bit().mr3().set_bit());
        cx.device
            .EXTI
            .ftsr
            .modify(|_, w| w.tr1().set_bit().tr3().set_bit());

        /*
         * Serial links: USART1 to host PC, USART2 to IoT modem
         *
         */

        let tx = gpioa.pa9.into_alternate_push_pull(&mut gpioa.crh);
        let rx = gpioa.pa10;
        let mut pc = Serial::usart1(
            cx.device.USART1,
            (tx, rx),
            &mut afio.mapr,
            Config::default().baudrate(Baud::B115200.bps().bps()),
            clocks,
            &mut rcc.apb2,
        );
        pc.listen(Event::Rxne);

        let tx = gpioa.pa2.into_alternate_push_pull(&mut gpioa.crl);
        let rx = gpioa.pa3;
        let mut iot = Serial::usart2(
            cx.device.USART2,
            (tx, rx),
            &mut afio.mapr,
            Config::default().baudrate(Baud::B115200.bps().bps()),
            clocks,
            &mut rcc.apb1,
        );
        iot.listen(Event::Rxne);

        // modem held in reset until its boot stage
        let mut iot_en = gpioe.pe2.into_push_pull_output(&mut gpioe.crl);
        iot_en.set_low().ok();

        /*
         * Enable the monotonic timer based on CYCCNT
         *
         */
        cx.core.DCB.enable_trace();
        cx.core.DWT.enable_cycle_counter();

        /*
         * schedule tasks
         *
         */
        cx.schedule
            .adc_tick(cx.start + ADC_PERIOD.cycles())
            .unwrap();
        cx.schedule
            .debounce_tick(cx.start + DEBOUNCE_PERIOD.cycles())
            .unwrap();
        cx.schedule
            .drive_tick(cx.start + DRIVE_PERIOD.cycles())
            .unwrap();
        cx.schedule
            .boot_tick(cx.start + BOOT_PERIOD.cycles())
            .unwrap();

        /*
         * init late resources
         *
         */

        init::LateResources {
            dev: SharedDeviceState::new(led),
            robot: Robot::new(wheels, cfg),
            exti: cx.device.EXTI,
            clocks,
            adc,
            sensors,
            pc,
            iot,
            iot_en,
        }
    }

    /*
     * Idle loop is the cooperative main loop
     *
     */
    #[idle(resources = [dev, robot, clocks, iot_en, pc, iot])]
    fn idle(mut cx: idle::Context) -> ! {
        let robot = cx.resources.robot;
        let mut dev = Shared(cx.resources.dev);

        loop {
            robot.run_once(&mut dev);

            while let Some(action) = robot.pop_action() {
                match action {
                    Actions::Debug(e) => {
                        rprintln!("event: {:?}", e);
                    }
                    Actions::Baud(b) => {
                        // link already holds both transmitters
                        cx.resources.pc.lock(|pc| pc.unlisten(Event::Txe));
                        cx.resources.iot.lock(|iot| iot.unlisten(Event::Txe));

                        let clocks = *cx.resources.clocks;
                        cm::interrupt::free(|_| set_baud(b, &clocks));

                        dev.lock(|d| d.link.resume());
                    }
                    Actions::IotPower(on) => {
                        if on {
                            cx.resources.iot_en.set_high().ok();
                        } else {
                            cx.resources.iot_en.set_low().ok();
                        }
                    }
                    Actions::AdcReset => {
                        cm::interrupt::free(|_| adc_restart());
                        rprintln!("adc: converter restarted");
                    }
                }
            }

            let display = robot.display_mut();
            if display.take_changed() {
                for n in 0..config::DISPLAY_LINES {
                    let line = core::str::from_utf8(display.line(n)).unwrap_or("");
                    rprintln!("| {} |", line);
                }
            }

            // arm transmitters with pending data
            let (pc_tx, iot_tx) =
                dev.lock(|d| (d.link.tx_enabled(Port::Pc), d.link.tx_enabled(Port::Iot)));

            if pc_tx {
                cx.resources.pc.lock(|pc| pc.listen(Event::Txe));
            }

            if iot_tx {
                cx.resources.iot.lock(|iot| iot.listen(Event::Txe));
            }
        }
    }

    /*
     * This interrupt is used to dispatch timer queue tasks.
     *
     */
    extern "C" {
        fn EXTI2();
    }

    /*
     * Periodic ticks
     *
     */

    #[task(schedule = [adc_tick], resources = [dev, adc, sensors])]
    fn adc_tick(cx: adc_tick::Context) {
        let dev = cx.resources.dev;
        let adc = cx.resources.adc;
        let s = cx.resources.sensors;

        let mut next = dev.on_timer(Tick::Adc);
        while let Some(ch) = next {
            let raw: Result<u16, ()> = match ch {
                Channel::Left => nb::block!(adc.read(&mut s.left)),
                Channel::Right => nb::block!(adc.read(&mut s.right)),
                Channel::Thumb => nb::block!(adc.read(&mut s.thumb)),
            };

            next = match dev.on_conversion(raw.unwrap_or(0)) {
                Ok(ch) => ch,
                Err(e) => {
                    rprintln!("adc: {:?}", e);
                    None
                }
            };
        }

        cx.schedule
            .adc_tick(cx.scheduled + ADC_PERIOD.cycles())
            .unwrap();
    }

    #[task(schedule = [debounce_tick], resources = [dev, exti])]
    fn debounce_tick(cx: debounce_tick::Context) {
        let rearm = cx.resources.dev.on_debounce_tick();

        if rearm[0] {
            cx.resources.exti.imr.modify(|_, w| w.mr1().set_bit());
        }

        if rearm[1] {
            cx.resources.exti.imr.modify(|_, w| w.mr3().set_bit());
        }

        cx.schedule
            .debounce_tick(cx.scheduled + DEBOUNCE_PERIOD.cycles())
            .unwrap();
    }

    #[task(schedule = [drive_tick], resources = [dev])]
    fn drive_tick(cx: drive_tick::Context) {
        if let Err(e) = cx.resources.dev.on_drive_tick() {
            rprintln!("adc: {:?}", e);
        }

        cx.schedule
            .drive_tick(cx.scheduled + DRIVE_PERIOD.cycles())
            .unwrap();
    }

    #[task(schedule = [boot_tick], resources = [dev])]
    fn boot_tick(cx: boot_tick::Context) {
        cx.resources.dev.on_boot_tick();

        cx.schedule
            .boot_tick(cx.scheduled + BOOT_PERIOD.cycles())
            .unwrap();
    }

    /*
     * Buttons
     *
     */

    #[task(binds = EXTI1, resources = [dev, exti])]
    fn exti1(cx: exti1::Context) {
        let exti = cx.resources.exti;

        exti.pr.modify(|_, w| w.pr1().set_bit());
        if cx.resources.dev.on_button_edge(Button::B1) {
            exti.imr.modify(|_, w| w.mr1().clear_bit());
        }
    }

    #[task(binds = EXTI3, resources = [dev, exti])]
    fn exti3(cx: exti3::Context) {
        let exti = cx.resources.exti;

        exti.pr.modify(|_, w| w.pr3().set_bit());
        if cx.resources.dev.on_button_edge(Button::B2) {
            exti.imr.modify(|_, w| w.mr3().clear_bit());
        }
    }

    /*
     * Serial links: receive feeds the rings, transmit drains them
     *
     */

    #[task(binds = USART1, resources = [dev, pc])]
    fn usart1(cx: usart1::Context) {
        let dev = cx.resources.dev;
        let pc = cx.resources.pc;

        if let Ok(b) = pc.read() {
            dev.link.on_pc_rx(b);
        }

        if dev.link.pump(Port::Pc, pc).is_err() || !dev.link.tx_enabled(Port::Pc) {
            pc.unlisten(Event::Txe);
        }
    }

    #[task(binds = USART2, resources = [dev, iot])]
    fn usart2(cx: usart2::Context) {
        let dev = cx.resources.dev;
        let iot = cx.resources.iot;

        if let Ok(b) = iot.read() {
            dev.link.on_iot_rx(b);
        }

        if dev.link.pump(Port::Iot, iot).is_err() || !dev.link.tx_enabled(Port::Iot) {
            iot.unlisten(Event::Txe);
        }
    }
};

/// Switch both links to a new speed: caller masks interrupts
fn set_baud(baud: Baud, clocks: &Clocks) {
    let pc = unsafe { &*USART1::ptr() };
    let iot = unsafe { &*USART2::ptr() };

    // let the last byte on the wire finish at the old speed
    while pc.sr.read().tc().bit_is_clear() {}
    while iot.sr.read().tc().bit_is_clear() {}

    let pc_div = clocks.pclk2().0 / baud.bps();
    let iot_div = clocks.pclk1().0 / baud.bps();

    pc.brr.write(|w| unsafe { w.bits(pc_div) });
    iot.brr.write(|w| unsafe { w.bits(iot_div) });
}

/// Power cycle the converter after a sampler stall: caller masks interrupts
fn adc_restart() {
    let adc = unsafe { &*stm32::ADC1::ptr() };

    adc.cr2.modify(|_, w| w.adon().clear_bit());
    adc.cr2.modify(|_, w| w.adon().set_bit());
}
