use core::time::Duration;

use lorawan_mac::{
    class::{class_a::State, SendAbort, SendStatus},
    config::{DevAddr, DeviceConfig},
    lorawan::{channels::LogicalChannel, commands::MacCommand},
    radio::{Radio, RadioState, RxConfig, RxQuality},
};

mod mock;
use mock::{
    create_device_with, create_test_device, downlink, parse_uplink, run_to_completion, run_until,
    send_uplink, TestDevice, DEV_ADDR,
};

/// 8 symbols at SF12/125 kHz
const SF12_WINDOW: Duration = Duration::from_micros(262_144);

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn quality() -> RxQuality {
    RxQuality { rssi: -90, snr: 5 }
}

/// Device at DR5 on a single channel in the 10% sub-band, so that the duty
/// cycle never outlasts the receive windows
fn create_fast_device(config: DeviceConfig) -> TestDevice {
    let mut device = create_device_with(config);
    let plan = device.channel_plan_mut();
    for i in 0..3 {
        plan.channel_mut(i).unwrap().enabled = false;
    }
    plan.set_channel(3, LogicalChannel::new(869_500_000, 0, 5)).unwrap();
    device.set_data_rate(5).unwrap();
    device
}

fn confirmed_config(nb_trans: u8) -> DeviceConfig {
    let mut config = DeviceConfig::new(DEV_ADDR);
    config.confirmed = true;
    config.nb_trans = nb_trans;
    config
}

#[test]
fn test_class_a_receive_windows() {
    let mut device = create_test_device();
    let status = device.send(Duration::ZERO, b"ping").unwrap();
    assert_eq!(status, SendStatus::Sent);
    assert_eq!(device.state(), State::Transmitting);

    let tx = device.radio().get_last_tx_config().unwrap();
    assert_eq!(tx.power, 14);
    assert_eq!(tx.params.modulation.spreading_factor, 12);
    assert_eq!(
        device.radio().rx_configs(),
        &[RxConfig {
            frequency: tx.frequency,
            spreading_factor: 12
        }]
    );

    let tx_end = ms(1_200);
    device.on_tx_finished(tx_end).unwrap();
    assert_eq!(device.state(), State::WaitingRx1);
    assert_eq!(device.radio().state(), RadioState::Sleep);
    assert_eq!(device.next_deadline(), Some(tx_end + ms(1_000)));

    // RX1
    device.handle_timers(tx_end + ms(1_000)).unwrap();
    assert_eq!(device.state(), State::InRx1);
    assert_eq!(device.radio().state(), RadioState::Standby);
    assert_eq!(device.next_deadline(), Some(tx_end + ms(1_000) + SF12_WINDOW));

    device.handle_timers(tx_end + ms(1_000) + SF12_WINDOW).unwrap();
    assert_eq!(device.state(), State::WaitingRx2);
    assert_eq!(device.radio().state(), RadioState::Sleep);

    // RX2
    device.handle_timers(tx_end + ms(2_000)).unwrap();
    assert_eq!(device.state(), State::InRx2);
    assert_eq!(device.radio().state(), RadioState::Standby);
    assert_eq!(
        device.radio().rx_configs().last(),
        Some(&RxConfig {
            frequency: 869_525_000,
            spreading_factor: 12
        })
    );

    device.handle_timers(tx_end + ms(2_000) + SF12_WINDOW).unwrap();
    assert_eq!(device.state(), State::Idle);
    assert_eq!(device.radio().state(), RadioState::Sleep);
    assert_eq!(device.next_deadline(), None);

    let finished = &device.events().finished;
    assert_eq!(finished.len(), 1);
    assert!(finished[0].success);
    assert_eq!(finished[0].transmissions, 1);
    assert_eq!(finished[0].first_attempt, Duration::ZERO);
}

#[test]
fn test_handle_timers_catches_up() {
    let mut device = create_test_device();
    send_uplink(&mut device, Duration::ZERO, &[]);

    // a late call runs both windows in order
    device.handle_timers(ms(10_000)).unwrap();
    assert_eq!(device.next_deadline(), None);
    assert_eq!(device.radio().rx_configs().len(), 2);
    assert_eq!(device.events().finished.len(), 1);
}

#[test]
fn test_confirmed_ack_in_rx1() {
    let mut device = create_device_with(confirmed_config(3));
    send_uplink(&mut device, Duration::ZERO, b"data");
    assert!(device.is_waiting_ack());

    device.handle_timers(ms(1_000)).unwrap();
    device.radio_mut().set_state(RadioState::Rx);

    let frame = downlink(DEV_ADDR, true, &[], b"hi");
    device.on_packet_received(ms(1_100), &frame, quality()).unwrap();

    assert!(!device.is_waiting_ack());
    assert_eq!(device.radio().state(), RadioState::Sleep);
    assert_eq!(device.next_deadline(), None);
    assert_eq!(device.state(), State::Idle);

    let events = device.events();
    assert_eq!(events.received, vec![b"hi".to_vec()]);
    assert_eq!(events.finished.len(), 1);
    assert!(events.finished[0].success);
    assert_eq!(events.finished[0].transmissions, 1);
    assert_eq!(device.radio().tx_count(), 1);
}

#[test]
fn test_confirmed_retransmissions_exhausted() {
    let mut device = create_fast_device(confirmed_config(3));
    send_uplink(&mut device, Duration::ZERO, b"data");
    run_to_completion(&mut device);

    let radio = device.radio();
    assert_eq!(radio.tx_count(), 3);
    let first = radio.get_last_tx().unwrap();
    assert!(radio.transmitted().all(|frame| frame == first));
    let (_, fhdr) = parse_uplink(first);
    assert_eq!(fhdr.f_cnt, 0);
    assert_eq!(device.frame_counter(), 1);

    let events = device.events();
    assert_eq!(events.sent.len(), 1);
    assert_eq!(events.postponed.len(), 2);
    // the ACK timeout counts from the opening of RX2
    let rx2_end = ms(2_000) + SF12_WINDOW;
    for delay in &events.postponed {
        assert!(*delay >= ms(3_000) - rx2_end, "{:?}", delay);
        assert!(*delay <= ms(5_000) - rx2_end, "{:?}", delay);
    }
    assert_eq!(events.finished.len(), 1);
    assert!(!events.finished[0].success);
    assert_eq!(events.finished[0].transmissions, 3);
    assert_eq!(events.finished[0].first_attempt, Duration::ZERO);
    assert!(!device.is_waiting_ack());
}

#[test]
fn test_ack_on_retransmission() {
    let mut device = create_fast_device(confirmed_config(4));
    send_uplink(&mut device, Duration::ZERO, b"data");
    run_until(&mut device, ms(2_300));
    assert!(device.has_pending_transmission());

    // second attempt, acknowledged in RX2
    let retry_at = device.next_deadline().unwrap();
    run_until(&mut device, retry_at + ms(2_000));
    assert_eq!(device.radio().tx_count(), 2);
    assert_eq!(device.state(), State::InRx2);

    let frame = downlink(DEV_ADDR, true, &[], &[]);
    device.on_packet_received(retry_at + ms(2_100), &frame, quality()).unwrap();
    run_to_completion(&mut device);

    let events = device.events();
    assert_eq!(events.finished.len(), 1);
    assert!(events.finished[0].success);
    assert_eq!(events.finished[0].transmissions, 2);
    assert_eq!(device.radio().tx_count(), 2);
}

#[test]
fn test_rx2_skipped_while_receiving() {
    let mut device = create_device_with(confirmed_config(2));
    send_uplink(&mut device, Duration::ZERO, &[]);

    device.handle_timers(ms(1_000)).unwrap();
    device.radio_mut().set_state(RadioState::Rx);
    device.handle_timers(ms(2_000)).unwrap();

    // RX1 reception still running: RX2 never opened
    assert_eq!(device.radio().rx_configs().len(), 1);
    assert_eq!(device.next_deadline(), None);
    assert!(device.events().postponed.is_empty());

    device.on_reception_failed(ms(2_500)).unwrap();
    assert_eq!(device.radio().state(), RadioState::Sleep);
    assert!(device.has_pending_transmission());
    assert_eq!(device.events().postponed.len(), 1);
    assert!(device.is_waiting_ack());
}

#[test]
fn test_downlink_for_other_device() {
    let mut device = create_device_with(confirmed_config(2));
    send_uplink(&mut device, Duration::ZERO, &[]);
    device.handle_timers(ms(2_000)).unwrap();
    assert_eq!(device.state(), State::InRx2);

    let frame = downlink(DevAddr(0x0102_0304), true, &[], b"not ours");
    device.on_packet_received(ms(2_100), &frame, quality()).unwrap();
    assert!(device.is_waiting_ack());
    assert!(device.events().received.is_empty());
    assert!(device.events().finished.is_empty());
    assert!(!device.has_pending_transmission());

    // the retry is decided when RX2 closes
    device.handle_timers(ms(2_000) + SF12_WINDOW).unwrap();
    assert!(device.has_pending_transmission());
    assert_eq!(device.events().postponed.len(), 1);
}

#[test]
fn test_downlink_without_ack_triggers_retry() {
    let mut device = create_device_with(confirmed_config(2));
    send_uplink(&mut device, Duration::ZERO, &[]);
    device.handle_timers(ms(1_000)).unwrap();

    let frame = downlink(DEV_ADDR, false, &[], &[]);
    device.on_packet_received(ms(1_100), &frame, quality()).unwrap();
    assert!(device.is_waiting_ack());
    assert!(device.has_pending_transmission());
    assert_eq!(device.events().received.len(), 1);
}

#[test]
fn test_duty_cycle_postpones_next_uplink() {
    let mut device = create_test_device();
    send_uplink(&mut device, Duration::ZERO, &[]);
    run_to_completion(&mut device);

    // 9 byte frame at SF12 lasts 991.232 ms, the 1% sub-band closes for 100 times that
    let band_free = device
        .channel_plan()
        .sub_band_for(868_100_000)
        .unwrap()
        .next_transmit_time;
    assert_eq!(band_free, Duration::from_micros(99_123_200));

    let now = ms(10_000);
    let status = device.send(now, &[]).unwrap();
    assert_eq!(status, SendStatus::Postponed(band_free - now));
    assert_eq!(device.radio().tx_count(), 1);
    assert_eq!(device.events().postponed, vec![band_free - now]);

    run_until(&mut device, band_free);
    assert_eq!(device.radio().tx_count(), 2);
    assert_eq!(device.frame_counter(), 2);
}

#[test]
fn test_new_uplink_waits_for_receive_windows() {
    let mut device = create_fast_device(DeviceConfig::new(DEV_ADDR));
    send_uplink(&mut device, Duration::ZERO, b"one");

    let now = ms(500);
    let rx2_end = ms(2_000) + SF12_WINDOW;
    let status = device.send(now, b"two").unwrap();
    assert_eq!(status, SendStatus::Postponed(rx2_end - now));

    run_until(&mut device, rx2_end);
    assert_eq!(device.radio().tx_count(), 2);
    let (_, fhdr) = parse_uplink(device.radio().get_last_tx().unwrap());
    assert_eq!(fhdr.f_cnt, 1);

    // the first uplink is settled before the second goes on air
    let events = device.events();
    assert_eq!(events.finished.len(), 1);
    assert!(events.finished[0].success);
    assert_eq!(parse_uplink(&events.finished[0].frame).1.f_cnt, 0);
}

#[test]
fn test_uplink_waits_for_reception_at_rx2_end() {
    let mut device = create_fast_device(DeviceConfig::new(DEV_ADDR));
    device.send(Duration::ZERO, b"one").unwrap();
    device.on_tx_finished(ms(100)).unwrap();

    let rx2_end = ms(2_100) + SF12_WINDOW;
    let status = device.send(ms(150), b"two").unwrap();
    assert_eq!(status, SendStatus::Postponed(rx2_end - ms(150)));

    run_until(&mut device, ms(2_100));
    assert_eq!(device.state(), State::InRx2);
    device.radio_mut().set_state(RadioState::Rx);

    // the preamble locked: RX2 stays open and nothing goes on air
    device.handle_timers(rx2_end).unwrap();
    assert_eq!(device.radio().tx_count(), 1);
    assert_eq!(device.radio().state(), RadioState::Rx);
    assert!(device.has_pending_transmission());
    assert_eq!(device.next_deadline(), None);
    assert!(device.events().finished.is_empty());

    device.on_reception_failed(rx2_end + ms(50)).unwrap();
    assert_eq!(device.radio().tx_count(), 2);
    assert_eq!(device.radio().state(), RadioState::Tx);
    assert!(device.radio().get_last_tx().unwrap().ends_with(b"two"));
    assert!(!device.has_pending_transmission());

    let events = device.events();
    assert_eq!(events.postponed.len(), 1);
    assert_eq!(events.finished.len(), 1);
    assert_eq!(parse_uplink(&events.finished[0].frame).1.f_cnt, 0);
}

#[test]
fn test_uplink_held_while_transmitting() {
    let mut device = create_fast_device(DeviceConfig::new(DEV_ADDR));
    device.send(Duration::ZERO, b"one").unwrap();
    assert_eq!(device.state(), State::Transmitting);

    let status = device.send(ms(10), b"two").unwrap();
    assert_eq!(status, SendStatus::Postponed(Duration::ZERO));
    assert!(device.has_pending_transmission());
    assert_eq!(device.next_deadline(), None);

    // scheduled behind the receive windows once the radio is done
    device.on_tx_finished(ms(50)).unwrap();
    let rx2_end = ms(2_050) + SF12_WINDOW;
    assert_eq!(device.events().postponed, vec![rx2_end - ms(50)]);

    run_to_completion(&mut device);
    assert_eq!(device.radio().tx_count(), 2);
    assert!(device.radio().get_last_tx().unwrap().ends_with(b"two"));
}

#[test]
fn test_downlink_in_rx2_closes_the_window() {
    let mut device = create_fast_device(confirmed_config(3));
    send_uplink(&mut device, Duration::ZERO, b"data");
    run_until(&mut device, ms(2_000));
    assert_eq!(device.state(), State::InRx2);

    let frame = downlink(DEV_ADDR, false, &[], &[]);
    device.on_packet_received(ms(2_100), &frame, quality()).unwrap();
    assert!(device.has_pending_transmission());
    assert_eq!(device.events().postponed.len(), 1);
    let retry_at = device.next_deadline().unwrap();
    assert!(retry_at >= ms(3_000), "{:?}", retry_at);

    // no RX2 close left to schedule a second retry
    device.handle_timers(ms(2_000) + SF12_WINDOW).unwrap();
    assert_eq!(device.next_deadline(), Some(retry_at));
    assert_eq!(device.events().postponed.len(), 1);

    run_to_completion(&mut device);
    assert_eq!(device.radio().tx_count(), 3);
    let events = device.events();
    assert_eq!(events.postponed.len(), 2);
    assert_eq!(events.finished.len(), 1);
    assert!(!events.finished[0].success);
    assert_eq!(events.finished[0].transmissions, 3);
}

#[test]
fn test_early_downlink_cancels_rx1() {
    let mut device = create_test_device();
    send_uplink(&mut device, Duration::ZERO, &[]);
    assert_eq!(device.next_deadline(), Some(ms(1_000)));

    let frame = downlink(DEV_ADDR, false, &[], b"early");
    device.on_packet_received(ms(500), &frame, quality()).unwrap();
    assert_eq!(device.next_deadline(), None);

    device.handle_timers(ms(10_000)).unwrap();
    assert_eq!(device.radio().rx_configs().len(), 1);
    assert_eq!(device.radio().state(), RadioState::Sleep);
    assert_eq!(device.state(), State::Idle);
    assert_eq!(device.events().finished.len(), 1);
}

#[test]
fn test_postponed_uplink_outgrown_by_answers() {
    let mut device = create_fast_device(DeviceConfig::new(DEV_ADDR));
    send_uplink(&mut device, Duration::ZERO, b"one");

    // DR5 carries 230 bytes of MACPayload: exactly full
    let status = device.send(ms(100), &[0u8; 222]).unwrap();
    assert!(matches!(status, SendStatus::Postponed(_)));
    device.add_mac_command(MacCommand::LinkCheckReq).unwrap();

    run_to_completion(&mut device);
    assert_eq!(device.radio().tx_count(), 1);
    assert_eq!(device.events().aborted, vec![SendAbort::PayloadTooLarge]);
    assert!(!device.has_pending_transmission());
    assert_eq!(device.frame_counter(), 1);
}

#[test]
fn test_postponed_uplink_outgrown_by_data_rate() {
    let mut device = create_fast_device(DeviceConfig::new(DEV_ADDR));
    send_uplink(&mut device, Duration::ZERO, b"one");
    device.send(ms(100), &[0u8; 100]).unwrap();
    device.set_data_rate(0).unwrap();

    run_to_completion(&mut device);
    assert_eq!(device.radio().tx_count(), 1);
    assert_eq!(device.events().aborted, vec![SendAbort::PayloadTooLarge]);
}

#[test]
fn test_latest_postponed_uplink_wins() {
    let mut device = create_fast_device(DeviceConfig::new(DEV_ADDR));
    send_uplink(&mut device, Duration::ZERO, b"one");
    device.send(ms(100), b"two").unwrap();
    device.send(ms(200), b"three").unwrap();

    run_to_completion(&mut device);
    let frames: Vec<&[u8]> = device.radio().transmitted().collect();
    assert_eq!(frames.len(), 2);
    assert!(frames[1].ends_with(b"three"));
}

#[test]
fn test_new_uplink_fails_unacknowledged_confirmed() {
    let mut device = create_device_with(confirmed_config(3));
    send_uplink(&mut device, Duration::ZERO, b"first");
    run_until(&mut device, ms(3_000));
    assert!(device.has_pending_transmission());

    device.set_confirmed(false);
    let status = device.send(ms(10_000), b"second").unwrap();
    assert!(matches!(status, SendStatus::Postponed(_)));

    let events = device.events();
    assert_eq!(events.finished.len(), 1);
    assert!(!events.finished[0].success);
    assert_eq!(events.finished[0].transmissions, 1);

    run_to_completion(&mut device);
    assert_eq!(device.radio().tx_count(), 2);
    let (_, fhdr) = parse_uplink(device.radio().get_last_tx().unwrap());
    assert_eq!(fhdr.f_cnt, 1);
    assert!(device.radio().get_last_tx().unwrap().ends_with(b"second"));
}

#[test]
fn test_payload_too_large() {
    let mut device = create_test_device();
    // DR0 carries at most 59 bytes of MACPayload, 8 of them header
    let status = device.send(Duration::ZERO, &[0u8; 52]).unwrap();
    assert_eq!(status, SendStatus::Aborted(SendAbort::PayloadTooLarge));
    assert_eq!(device.radio().tx_count(), 0);
    assert_eq!(device.events().aborted, vec![SendAbort::PayloadTooLarge]);

    let status = device.send(Duration::ZERO, &[0u8; 51]).unwrap();
    assert_eq!(status, SendStatus::Sent);
    assert_eq!(device.radio().get_last_tx().unwrap().len(), 60);
}

#[test]
fn test_no_compatible_channel() {
    let mut device = create_test_device();
    device.set_tx_power_dbm(20);
    let status = device.send(Duration::ZERO, &[]).unwrap();
    assert_eq!(status, SendStatus::Aborted(SendAbort::NoCompatibleChannel));

    device.set_tx_power_dbm(14);
    device.channel_plan_mut().apply_channel_mask(0);
    let status = device.send(Duration::ZERO, &[]).unwrap();
    assert_eq!(status, SendStatus::Aborted(SendAbort::NoCompatibleChannel));
    assert_eq!(device.radio().tx_count(), 0);
    assert_eq!(device.frame_counter(), 0);
}
