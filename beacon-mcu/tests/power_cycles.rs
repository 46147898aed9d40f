use std::time::Duration;

use beacon_mcu::sim::{SimDevice, TransportEvent, TransportFaults};
use beacon_mcu::{
    BootReason, CounterSnapshot, Layout, LifecycleConfig, LifecycleError, Phase, ResetCause,
    RetainedBlock,
};
use beacon_proto::parse_service_data;

fn config() -> LifecycleConfig {
    LifecycleConfig {
        active_window: Duration::from_millis(2_500),
        update_interval: Duration::from_millis(1_000),
        ready_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

fn boots_on_air(cycle: &beacon_mcu::sim::SimCycle) -> [u8; 4] {
    let payload = cycle.report.last_payload.expect("payload was pushed");
    let mut boots = [0u8; 4];
    boots.copy_from_slice(&payload.service_data()[4..8]);
    boots
}

#[test]
fn fresh_device_end_to_end() {
    let mut device = SimDevice::new(config());
    assert!(!device.block().validate());

    let first = device.power_cycle();
    assert_eq!(first.report.boot_reason, BootReason::PowerOn);
    assert_eq!(first.report.reset, Some(ResetCause::PowerOn));
    assert_eq!(boots_on_air(&first), [0x01, 0x00, 0x00, 0x00]);
    assert_eq!(device.snapshot().boots, 1);
    assert_eq!(device.snapshot().off_count, 1);
    assert!(device.block().validate());

    let second = device.power_cycle();
    assert_eq!(second.report.boot_reason, BootReason::WakeFromOff);
    assert_eq!(second.report.reset, None);
    assert_eq!(boots_on_air(&second), [0x02, 0x00, 0x00, 0x00]);
    assert_eq!(device.snapshot().boots, 2);
    assert_eq!(device.snapshot().off_count, 2);
}

#[test]
fn boots_and_offs_track_cycle_count() {
    let mut device = SimDevice::new(config());

    for n in 1..=50u32 {
        let cycle = device.power_cycle();
        assert_eq!(cycle.report.snapshot.boots, n);
        assert_eq!(cycle.report.snapshot.off_count, n);
        assert!(device.block().validate());
    }
    assert_eq!(
        device.snapshot(),
        CounterSnapshot {
            boots: 50,
            off_count: 50,
            uptime_ms: 50 * 2_500,
        }
    );
}

#[test]
fn power_cut_before_persisting_leaves_off_count_behind() {
    let mut device = SimDevice::new(config());
    for _ in 0..4 {
        device.power_cycle();
    }

    let cut = device.power_cut_after(Phase::ActiveWindow);
    assert!(!cut.report.persisted());
    assert_eq!(device.snapshot().boots, 5);
    assert_eq!(device.snapshot().off_count, 4);
    // Counters were committed at boot, so the block survives the cut intact.
    assert!(device.block().validate());

    let next = device.power_cycle();
    assert_eq!(next.report.boot_reason, BootReason::Reset);
    assert_eq!(next.report.reset, None);
    assert_eq!(device.snapshot().boots, 6);
    assert_eq!(device.snapshot().off_count, 5);
    assert!(device.snapshot().boots >= device.snapshot().off_count);
}

#[test]
fn corrupted_block_is_reset_on_next_wake() {
    for index in 0..beacon_mcu::BLOCK_LEN {
        let mut device = SimDevice::new(config());
        device.power_cycle();
        device.power_cycle();

        device.corrupt_byte(index, 0x04).unwrap();
        assert!(!device.block().validate(), "corruption at byte {index} undetected");

        let cycle = device.power_cycle();
        assert_eq!(cycle.report.reset, Some(ResetCause::CorruptRetainedState));
        assert!(matches!(
            cycle.report.faults.first(),
            Some(LifecycleError::CorruptRetainedState(_))
        ));
        assert_eq!(boots_on_air(&cycle), [0x01, 0x00, 0x00, 0x00]);
        assert_eq!(device.snapshot().boots, 1);
        assert_eq!(device.snapshot().off_count, 1);
    }
}

#[test]
fn radio_failures_never_block_persisting() {
    let faults = [
        TransportFaults {
            init: true,
            ..Default::default()
        },
        TransportFaults {
            ready: Some(-12),
            ..Default::default()
        },
        TransportFaults {
            silent: true,
            ..Default::default()
        },
    ];

    for fault in faults {
        let mut device = SimDevice::new(config());
        device.faults = fault;

        let cycle = device.power_cycle();
        assert!(!cycle.report.advertised, "{fault:?}");
        // radio never came up: no window to wait out
        assert!(!cycle.report.phases.contains(&Phase::ActiveWindow), "{fault:?}");
        assert!(cycle.report.persisted(), "{fault:?}");
        assert_eq!(cycle.report.phases.last(), Some(&Phase::PoweringOff));
        assert!(cycle.armed.is_some());
        assert_eq!(device.snapshot().off_count, 1);
        assert!(!cycle.report.faults.is_empty());
        assert!(cycle.report.faults.iter().all(|f| !f.is_fatal()));
    }
}

#[test]
fn start_failure_keeps_device_awake_for_window() {
    let mut device = SimDevice::new(config());
    device.faults = TransportFaults {
        start: true,
        ..Default::default()
    };

    let cycle = device.power_cycle();
    assert!(!cycle.report.advertised);
    assert!(cycle.report.phases.contains(&Phase::ActiveWindow));
    assert_eq!(cycle.report.active_time, Duration::from_millis(2_500));
    assert_eq!(device.snapshot().uptime_ms, 2_500);
    assert_eq!(device.snapshot().off_count, 1);
    assert_eq!(cycle.events, vec![TransportEvent::Init]);
    assert!(matches!(
        cycle.report.faults.as_slice(),
        [LifecycleError::AdvertisingStartFailed(_)]
    ));
    assert!(cycle.armed.is_some());
}

#[test]
fn advertising_is_stopped_before_power_off() {
    let mut device = SimDevice::new(config());
    let cycle = device.power_cycle();

    assert_eq!(cycle.events.first(), Some(&TransportEvent::Init));
    assert!(matches!(cycle.events.get(1), Some(TransportEvent::Start(_))));
    assert_eq!(cycle.events.last(), Some(&TransportEvent::Stop));

    // 2.5 s window, 1 s refresh: updates at 1 s and 2 s
    let updates = cycle
        .events
        .iter()
        .filter(|e| matches!(e, TransportEvent::Update(_)))
        .count();
    assert_eq!(updates, 2);
    assert_eq!(cycle.report.pushes, 3);
}

#[test]
fn stop_failure_still_arms_wake() {
    let mut device = SimDevice::new(config());
    device.faults = TransportFaults {
        stop: true,
        ..Default::default()
    };

    let cycle = device.power_cycle();
    assert!(cycle.armed.is_some());
    assert!(matches!(
        cycle.report.faults.as_slice(),
        [LifecycleError::AdvertisingStopFailed(_)]
    ));
}

#[test]
fn extended_layout_reports_both_counters() {
    let config = LifecycleConfig {
        layout: Layout::Extended,
        device_name: "Beacon".to_string(),
        ..config()
    };
    let mut device = SimDevice::new(config);
    device.power_cycle();
    let cycle = device.power_cycle();

    let payload = cycle.report.last_payload.unwrap();
    let decoded = parse_service_data(payload.service_data()).unwrap();
    assert_eq!(decoded.boots(), Some(2));
    // the off count on air is the one committed before this boot
    assert_eq!(decoded.off_count(), Some(1));
}

#[test]
fn extended_layout_fits_with_default_name() {
    let config = LifecycleConfig {
        layout: Layout::Extended,
        ..Default::default()
    };
    let mut device = SimDevice::new(config);
    device.power_cycle();
    let cycle = device.power_cycle();

    assert!(cycle.report.advertised);
    assert!(cycle.report.faults.is_empty());
    let payload = cycle.report.last_payload.unwrap();
    assert!(payload.as_bytes().len() <= 31);
    assert!(payload.is_name_shortened());
    let decoded = parse_service_data(payload.service_data()).unwrap();
    assert_eq!(decoded.boots(), Some(2));
    assert_eq!(decoded.off_count(), Some(1));
}

#[test]
fn saturated_boot_counter_stays_put() {
    let mut block = RetainedBlock::new();
    for _ in 0..3 {
        block.on_boot().unwrap();
        block.on_off(1).unwrap();
    }
    block.commit();

    let mut image = block.to_bytes();
    image[0..4].copy_from_slice(&u32::MAX.to_le_bytes());
    image[4..8].copy_from_slice(&(u32::MAX - 1).to_le_bytes());
    let mut retagged = RetainedBlock::from_bytes(&image);
    retagged.commit();

    let mut device = SimDevice::with_retained(retagged, config(), BootReason::WakeFromOff);
    let cycle = device.power_cycle();

    assert_eq!(cycle.report.snapshot.boots, u32::MAX);
    assert_eq!(cycle.report.snapshot.off_count, u32::MAX);
    assert!(matches!(
        cycle.report.faults.as_slice(),
        [LifecycleError::CounterOverflow(_)]
    ));
    assert_eq!(boots_on_air(&cycle), [0xff, 0xff, 0xff, 0xff]);
    assert!(device.block().validate());
}

#[test]
fn devices_are_independent() {
    let mut a = SimDevice::new(config());
    let mut b = SimDevice::new(config());

    for _ in 0..3 {
        a.power_cycle();
    }
    b.power_cycle();

    assert_eq!(a.snapshot().boots, 3);
    assert_eq!(b.snapshot().boots, 1);
}
