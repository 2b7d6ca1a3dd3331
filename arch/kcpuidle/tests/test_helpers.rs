//! A fake dual-core SoC: PRCMU registers and TCDM, plus the CPU side of the
//! idle path. Virtual time only advances while a CPU spins.

#![allow(unused)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use kcpuidle::{CpuIdleController, IdleConfig, IdlePlatform};
use prcmu::{
    Mailbox, PowerTransition, Prcmu, PrcmuConfig, PrcmuHal, WAKE_MASK_WORDS,
    config::DEFAULT_LAYOUT,
    hal::{A9_MASK_REQ_BIT, PRCM_A9_MASK_REQ, PRCM_ARM_WFI_STANDBY, PRCM_MBOX_CPU_SET, wfi_standby_bit},
};

pub const WAKE_MASK: [u32; WAKE_MASK_WORDS] = [0x0000_00F0, 0, 0x8000_0000, 0x1];

/// Something the CPU side did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SaveCore(usize),
    RestoreCore(usize),
    SaveApe,
    RestoreApe,
    Wfi(usize),
    WakeTimer(usize, Option<Duration>),
    AlwaysOnTimer(Option<Duration>),
}

/// A mailbox 0 request as firmware saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerRequest {
    pub header: u8,
    pub payload: Vec<u8>,
}

pub struct FakeSoc {
    regs: Mutex<HashMap<usize, u32>>,
    tcdm: Mutex<Vec<u8>>,
    clock_ns: AtomicU64,
    requests: Mutex<Vec<PowerRequest>>,
    events: Mutex<Vec<Event>>,
    wake: Mutex<[bool; 2]>,
    wake_cv: Condvar,
    irq: [AtomicBool; 2],
    irq_on_decouple: Mutex<Option<usize>>,
    hide_wfi: [AtomicBool; 2],
    auto_wake: AtomicBool,
    decouples: AtomicUsize,
    recouples: AtomicUsize,
    /// Core context saved since the CPU last left WFI. Guarded together
    /// with the WFI standby bits by `regs`.
    saved: [AtomicBool; 2],
    /// Core powered off while in WFI and not restored yet.
    owed_restore: [AtomicBool; 2],
    lost_contexts: AtomicUsize,
    missed_restores: AtomicUsize,
}

impl FakeSoc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            regs: Mutex::new(HashMap::new()),
            tcdm: Mutex::new(vec![0; 0x1000]),
            clock_ns: AtomicU64::new(1_000_000_000),
            requests: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            wake: Mutex::new([false; 2]),
            wake_cv: Condvar::new(),
            irq: Default::default(),
            irq_on_decouple: Mutex::new(None),
            hide_wfi: Default::default(),
            auto_wake: AtomicBool::new(false),
            decouples: AtomicUsize::new(0),
            recouples: AtomicUsize::new(0),
            saved: Default::default(),
            owed_restore: Default::default(),
            lost_contexts: AtomicUsize::new(0),
            missed_restores: AtomicUsize::new(0),
        })
    }

    /// Current virtual time.
    pub fn clock(&self) -> Duration {
        Duration::from_nanos(self.clock_ns.load(Ordering::SeqCst))
    }

    /// Deadline `ms` milliseconds from now.
    pub fn after_ms(&self, ms: u64) -> Option<Duration> {
        Some(self.clock() + Duration::from_millis(ms))
    }

    fn tick(&self) {
        self.clock_ns.fetch_add(1_000, Ordering::SeqCst);
        thread::yield_now();
    }

    pub fn reg(&self, offset: usize) -> u32 {
        self.regs.lock().unwrap().get(&offset).copied().unwrap_or(0)
    }

    pub fn set_reg(&self, offset: usize, value: u32) {
        self.regs.lock().unwrap().insert(offset, value);
    }

    fn update_reg(&self, offset: usize, f: impl FnOnce(u32) -> u32) {
        let mut regs = self.regs.lock().unwrap();
        let v = regs.entry(offset).or_default();
        *v = f(*v);
    }

    pub fn requests(&self) -> Vec<PowerRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }

    pub fn position(&self, event: Event) -> Option<usize> {
        self.events().iter().position(|e| *e == event)
    }

    fn log(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn decouples(&self) -> usize {
        self.decouples.load(Ordering::SeqCst)
    }

    pub fn recouples(&self) -> usize {
        self.recouples.load(Ordering::SeqCst)
    }

    pub fn gic_decoupled(&self) -> bool {
        self.reg(PRCM_A9_MASK_REQ) & A9_MASK_REQ_BIT != 0
    }

    /// Lets `cpu` out of its (next) WFI.
    pub fn wake(&self, cpu: usize) {
        self.wake.lock().unwrap()[cpu] = true;
        self.wake_cv.notify_all();
    }

    /// Makes every WFI return at once.
    pub fn set_auto_wake(&self, on: bool) {
        self.auto_wake.store(on, Ordering::SeqCst);
        self.wake_cv.notify_all();
    }

    /// Marks an interrupt pending for `cpu`.
    pub fn raise_irq(&self, cpu: usize) {
        self.irq[cpu].store(true, Ordering::SeqCst);
    }

    /// Raises an interrupt for `cpu` as soon as the GIC gets decoupled.
    pub fn irq_on_decouple(&self, cpu: usize) {
        *self.irq_on_decouple.lock().unwrap() = Some(cpu);
    }

    /// Keeps the WFI standby bit of `cpu` clear.
    pub fn hide_wfi(&self, cpu: usize) {
        self.hide_wfi[cpu].store(true, Ordering::SeqCst);
    }

    /// Blocks until `event` was logged.
    pub fn wait_for(&self, event: Event) {
        let start = Instant::now();
        while self.position(event).is_none() {
            assert!(start.elapsed() < Duration::from_secs(10), "{event:?} never happened");
            thread::yield_now();
        }
    }

    /// Blocks until `cpu` shows up in WFI standby.
    pub fn wait_in_wfi(&self, cpu: usize) {
        let start = Instant::now();
        while self.reg(PRCM_ARM_WFI_STANDBY) & wfi_standby_bit(cpu) == 0 {
            assert!(start.elapsed() < Duration::from_secs(10), "CPU {cpu} never reached WFI");
            thread::yield_now();
        }
    }

    /// Cores that were powered off while in WFI without a saved context.
    pub fn lost_contexts(&self) -> usize {
        self.lost_contexts.load(Ordering::SeqCst)
    }

    /// Cores that went back to WFI without restoring a lost context.
    pub fn missed_restores(&self) -> usize {
        self.missed_restores.load(Ordering::SeqCst)
            + self.owed_restore.iter().filter(|o| o.load(Ordering::SeqCst)).count()
    }

    fn record_request(&self, value: u32) {
        if value & Mailbox::Mb0.bit().bits() == 0 {
            return;
        }
        let layout = DEFAULT_LAYOUT[0];
        let request = {
            let tcdm = self.tcdm.lock().unwrap();
            PowerRequest {
                header: tcdm[Mailbox::Mb0.req_header_offset()],
                payload: tcdm[layout.req_offset..layout.req_offset + layout.req_len].to_vec(),
            }
        };
        let transition = PowerTransition::from_repr(request.payload[0]);
        if matches!(transition, Some(PowerTransition::ApDeepIdle | PowerTransition::ApDeepSleep)) {
            let regs = self.regs.lock().unwrap();
            let standby = regs.get(&PRCM_ARM_WFI_STANDBY).copied().unwrap_or(0);
            for cpu in 0..2 {
                if standby & wfi_standby_bit(cpu) != 0 {
                    if !self.saved[cpu].load(Ordering::SeqCst) {
                        self.lost_contexts.fetch_add(1, Ordering::SeqCst);
                    }
                    self.owed_restore[cpu].store(true, Ordering::SeqCst);
                }
            }
        }
        self.requests.lock().unwrap().push(request);
    }
}

impl PrcmuHal for FakeSoc {
    fn read_reg(&self, offset: usize) -> u32 {
        self.reg(offset)
    }

    fn write_reg(&self, offset: usize, value: u32) {
        match offset {
            PRCM_MBOX_CPU_SET => self.record_request(value),
            PRCM_A9_MASK_REQ => {
                let was = self.reg(offset) & A9_MASK_REQ_BIT != 0;
                let now = value & A9_MASK_REQ_BIT != 0;
                if now && !was {
                    self.decouples.fetch_add(1, Ordering::SeqCst);
                    if let Some(cpu) = *self.irq_on_decouple.lock().unwrap() {
                        self.raise_irq(cpu);
                    }
                }
                if was && !now {
                    self.recouples.fetch_add(1, Ordering::SeqCst);
                }
                self.set_reg(offset, value);
            }
            _ => self.set_reg(offset, value),
        }
    }

    fn tcdm_read(&self, offset: usize) -> u8 {
        self.tcdm.lock().unwrap()[offset]
    }

    fn tcdm_write(&self, offset: usize, value: u8) {
        self.tcdm.lock().unwrap()[offset] = value;
    }

    fn now(&self) -> Duration {
        self.clock()
    }

    fn relax(&self) {
        self.tick();
    }
}

impl IdlePlatform for FakeSoc {
    fn now(&self) -> Duration {
        self.clock()
    }

    fn irq_pending(&self, cpu: usize) -> bool {
        self.irq[cpu].load(Ordering::SeqCst)
    }

    fn enabled_irq_mask(&self, mask: &mut [u32; WAKE_MASK_WORDS]) {
        *mask = WAKE_MASK;
    }

    fn save_core_context(&self, cpu: usize) {
        self.saved[cpu].store(true, Ordering::SeqCst);
        self.log(Event::SaveCore(cpu));
    }

    fn restore_core_context(&self, cpu: usize) {
        self.owed_restore[cpu].store(false, Ordering::SeqCst);
        self.log(Event::RestoreCore(cpu));
    }

    fn save_ape_context(&self) {
        self.log(Event::SaveApe);
    }

    fn restore_ape_context(&self) {
        self.log(Event::RestoreApe);
    }

    fn wait_for_interrupt(&self, cpu: usize) {
        if self.owed_restore[cpu].swap(false, Ordering::SeqCst) {
            self.missed_restores.fetch_add(1, Ordering::SeqCst);
        }
        self.log(Event::Wfi(cpu));
        if !self.hide_wfi[cpu].load(Ordering::SeqCst) {
            self.update_reg(PRCM_ARM_WFI_STANDBY, |v| v | wfi_standby_bit(cpu));
        }
        {
            let mut wake = self.wake.lock().unwrap();
            while !wake[cpu] && !self.auto_wake.load(Ordering::SeqCst) {
                wake = self.wake_cv.wait(wake).unwrap();
            }
            wake[cpu] = false;
        }
        if self.auto_wake.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        let mut regs = self.regs.lock().unwrap();
        *regs.entry(PRCM_ARM_WFI_STANDBY).or_default() &= !wfi_standby_bit(cpu);
        self.saved[cpu].store(false, Ordering::SeqCst);
    }

    fn arm_wake_timer(&self, cpu: usize, deadline: Option<Duration>) {
        self.log(Event::WakeTimer(cpu, deadline));
    }

    fn arm_always_on_timer(&self, deadline: Option<Duration>) {
        self.log(Event::AlwaysOnTimer(deadline));
    }

    fn cpu_relax(&self) {
        self.tick();
    }
}

pub type Controller = CpuIdleController<FakeSoc, FakeSoc>;

pub struct Rig {
    pub soc: Arc<FakeSoc>,
    pub prcmu: Arc<Prcmu<FakeSoc>>,
    pub idle: Arc<Controller>,
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rig(config: IdleConfig) -> Rig {
    init_logger();
    let soc = FakeSoc::new();
    let prcmu = Arc::new(Prcmu::new(
        soc.clone(),
        PrcmuConfig::new().with_gic_settle(Duration::ZERO),
    ));
    let idle = Arc::new(CpuIdleController::new(prcmu.clone(), soc.clone(), config).unwrap());
    Rig { soc, prcmu, idle }
}

pub fn default_rig() -> Rig {
    rig(IdleConfig::new().with_sibling_wait_timeout(Duration::from_secs(1)))
}

/// Runs `enter_idle` for `cpu` on its own thread, standing in for the second core.
pub fn spawn_idle(
    rig: &Rig,
    cpu: usize,
    deadline: Option<Duration>,
) -> thread::JoinHandle<kcpuidle::IdleOutcome> {
    let idle = rig.idle.clone();
    thread::spawn(move || idle.enter_idle(cpu, deadline))
}
