
use std::sync::Arc;

use prcmu::{
    ClockDesc, ClockOps, ClockService, ClockTable, Mailbox, MailboxError, PrcmuClock, PrcmuError,
    clock::{MB3H_SYSCLK, PRCC_KCKDIS, PRCC_KCKEN, PRCC_PCKDIS, PRCC_PCKEN, REQ_MB3_SYSCLK_MGT},
    hal::CLK_MGT_CLKEN,
};
use test_helpers::*;

type Service = ClockService<FakeFirmware, FakePrcc>;

fn service(descs: &[ClockDesc]) -> (Arc<FakeFirmware>, Arc<FakePrcc>, Arc<prcmu::Prcmu<FakeFirmware>>, Service) {
    let (fw, prcmu) = setup();
    let prcc = FakePrcc::new();
    let table = ClockTable::new(descs).unwrap();
    let svc = ClockService::new(prcmu.clone(), prcc.clone(), table);
    (fw, prcc, prcmu, svc)
}

fn gated_tree() -> [ClockDesc; 3] {
    [
        ClockDesc::new("p2", ClockOps::PrccPeripheral { cluster: 2, bit: 1 }),
        ClockDesc::new("p1", ClockOps::PrccKernel { cluster: 2, bit: 3 }),
        ClockDesc::new("child", ClockOps::PrccKernel { cluster: 2, bit: 4 })
            .with_parent("p1")
            .with_bus_parent("p2"),
    ]
}

#[test]
fn test_enable_switches_bus_then_parent_then_self() {
    let (_fw, prcc, _prcmu, svc) = service(&gated_tree());
    let child = svc.lookup("child").unwrap();
    let p1 = svc.lookup("p1").unwrap();
    let p2 = svc.lookup("p2").unwrap();

    svc.enable(child).unwrap();
    assert_eq!(
        prcc.writes(),
        vec![(2, PRCC_PCKEN, 1 << 1), (2, PRCC_KCKEN, 1 << 3), (2, PRCC_KCKEN, 1 << 4)]
    );
    assert_eq!((svc.ref_count(p2), svc.ref_count(p1), svc.ref_count(child)), (1, 1, 1));

    svc.disable(child).unwrap();
    assert_eq!(
        &prcc.writes()[3..],
        &[(2, PRCC_KCKDIS, 1 << 4), (2, PRCC_KCKDIS, 1 << 3), (2, PRCC_PCKDIS, 1 << 1)]
    );
    assert_eq!((svc.ref_count(p2), svc.ref_count(p1), svc.ref_count(child)), (0, 0, 0));
}

#[test]
fn test_balanced_sequences_switch_hardware_once() {
    let (_fw, prcc, _prcmu, svc) = service(&gated_tree());
    let child = svc.lookup("child").unwrap();
    let p1 = svc.lookup("p1").unwrap();

    svc.enable(child).unwrap();
    svc.enable(p1).unwrap();
    svc.enable(child).unwrap();
    assert_eq!(svc.ref_count(child), 2);
    assert_eq!(svc.ref_count(p1), 2);
    assert_eq!(prcc.writes().len(), 3);

    svc.disable(child).unwrap();
    svc.disable(p1).unwrap();
    assert!(svc.is_enabled(p1));
    assert_eq!(prcc.writes().len(), 3);

    svc.disable(child).unwrap();
    for name in ["p2", "p1", "child"] {
        assert!(!svc.is_enabled(svc.lookup(name).unwrap()), "{name} still on");
    }
    assert_eq!(prcc.writes().len(), 6);
}

#[test]
fn test_shared_ancestor_counts_each_child() {
    let (_fw, prcc, _prcmu, svc) = service(&[
        ClockDesc::new("root", ClockOps::PrccPeripheral { cluster: 1, bit: 0 }),
        ClockDesc::new("left", ClockOps::Fixed).with_parent("root"),
        ClockDesc::new("right", ClockOps::Fixed).with_parent("root"),
        ClockDesc::new("leaf", ClockOps::Fixed)
            .with_parent("left")
            .with_bus_parent("right"),
    ]);
    let root = svc.lookup("root").unwrap();
    let leaf = svc.lookup("leaf").unwrap();

    svc.enable(leaf).unwrap();
    assert_eq!(svc.ref_count(root), 2);
    assert_eq!(prcc.writes(), vec![(1, PRCC_PCKEN, 1)]);

    svc.disable(leaf).unwrap();
    assert_eq!(svc.ref_count(root), 0);
    assert_eq!(prcc.writes(), vec![(1, PRCC_PCKEN, 1), (1, PRCC_PCKDIS, 1)]);
}

#[test]
fn test_disable_without_enable_is_rejected() {
    let (_fw, prcc, _prcmu, svc) = service(&gated_tree());
    let child = svc.lookup("child").unwrap();
    assert_eq!(svc.disable(child), Err(PrcmuError::InvalidArgument));
    assert!(prcc.writes().is_empty());
}

#[test]
fn test_unknown_clock_name() {
    let (_fw, _prcc, _prcmu, svc) = service(&gated_tree());
    assert_eq!(svc.lookup("nope").unwrap_err(), PrcmuError::UnknownClock);
}

#[test]
fn test_prcmu_register_clock() {
    let (fw, _prcc, _prcmu, svc) = service(&[ClockDesc::new("uartclk", ClockOps::Prcmu(PrcmuClock::UartClk))]);
    let offset = PrcmuClock::UartClk.mgt_offset().unwrap();
    fw.set_reg(offset, 0x0000_0025);
    let clk = svc.lookup("uartclk").unwrap();

    svc.enable(clk).unwrap();
    assert_eq!(fw.reg(offset), 0x0000_0025 | CLK_MGT_CLKEN);
    svc.disable(clk).unwrap();
    assert_eq!(fw.reg(offset), 0x0000_0025);
}

#[test]
fn test_sysclk_goes_through_mailbox() {
    let (fw, _prcc, prcmu, svc) = service(&[ClockDesc::new("sysclk", ClockOps::Prcmu(PrcmuClock::SysClk))]);
    let _irq = spawn_irq_thread(prcmu);
    let clk = svc.lookup("sysclk").unwrap();

    svc.enable(clk).unwrap();
    svc.disable(clk).unwrap();
    let seen = fw.requests_on(Mailbox::Mb3);
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|r| r.header == MB3H_SYSCLK));
    assert_eq!(seen[0].payload[REQ_MB3_SYSCLK_MGT], 1);
    assert_eq!(seen[1].payload[REQ_MB3_SYSCLK_MGT], 0);
}

#[test]
fn test_enable_failure_rolls_back() {
    let (fw, prcc, prcmu, svc) = service(&[
        ClockDesc::new("per1", ClockOps::PrccPeripheral { cluster: 1, bit: 2 }),
        ClockDesc::new("sysclk", ClockOps::Prcmu(PrcmuClock::SysClk)),
        ClockDesc::new("uart0", ClockOps::PrccKernel { cluster: 1, bit: 2 })
            .with_parent("sysclk")
            .with_bus_parent("per1"),
    ]);
    fw.always(
        Mailbox::Mb3,
        Reply::Ack {
            status: 0x01,
            payload: vec![],
        },
    );
    let _irq = spawn_irq_thread(prcmu);
    let uart = svc.lookup("uart0").unwrap();

    assert_eq!(
        svc.enable(uart),
        Err(PrcmuError::Mailbox(MailboxError::Nacked(0x01)))
    );
    assert_eq!(prcc.writes(), vec![(1, PRCC_PCKEN, 1 << 2), (1, PRCC_PCKDIS, 1 << 2)]);
    for name in ["per1", "sysclk", "uart0"] {
        assert_eq!(svc.ref_count(svc.lookup(name).unwrap()), 0, "{name}");
    }
}

#[test]
fn test_disable_failure_still_drops_counts() {
    let (fw, prcc, prcmu, svc) = service(&[
        ClockDesc::new("sysclk", ClockOps::Prcmu(PrcmuClock::SysClk)),
        ClockDesc::new("sdmmc", ClockOps::PrccKernel { cluster: 3, bit: 1 }).with_parent("sysclk"),
    ]);
    let _irq = spawn_irq_thread(prcmu);
    let sdmmc = svc.lookup("sdmmc").unwrap();
    let sysclk = svc.lookup("sysclk").unwrap();
    svc.enable(sdmmc).unwrap();

    fw.always(
        Mailbox::Mb3,
        Reply::Ack {
            status: 0x02,
            payload: vec![],
        },
    );
    assert_eq!(
        svc.disable(sdmmc),
        Err(PrcmuError::Mailbox(MailboxError::Nacked(0x02)))
    );
    assert_eq!(svc.ref_count(sdmmc), 0);
    assert_eq!(svc.ref_count(sysclk), 0);
    assert_eq!(prcc.writes().last(), Some(&(3, PRCC_KCKDIS, 1 << 1)));
}

#[test]
fn test_concurrent_enable_disable_keeps_counts_consistent() {
    let (_fw, prcc, _prcmu, svc) = service(&gated_tree());
    let svc = Arc::new(svc);
    let handles: Vec<_> = ["child", "p1", "child", "p2"]
        .into_iter()
        .map(|name| {
            let svc = svc.clone();
            std::thread::spawn(move || {
                let id = svc.lookup(name).unwrap();
                for _ in 0..100 {
                    svc.enable(id).unwrap();
                    svc.disable(id).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    for name in ["p2", "p1", "child"] {
        assert_eq!(svc.ref_count(svc.lookup(name).unwrap()), 0, "{name}");
    }
    let writes = prcc.writes();
    let ons = writes.iter().filter(|w| w.1 == PRCC_PCKEN || w.1 == PRCC_KCKEN).count();
    let offs = writes.iter().filter(|w| w.1 == PRCC_PCKDIS || w.1 == PRCC_KCKDIS).count();
    assert_eq!(ons, offs);
}
