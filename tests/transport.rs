// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! End-to-end transport tests. Inbound datagrams are injected by unicast to
//! the bound port, which is deliverable everywhere real broadcast loopback
//! is not.

use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use geomessage_broadcast::{
    Geomessage, GeomessageListener, MessageController, ACTION_FIELD, CONTROL_POINTS_FIELD,
    TYPE_FIELD, UNIQUE_DESIGNATION_FIELD,
};

/// Interleaved event log so relative ordering of raw and record deliveries
/// can be asserted.
#[derive(Clone, Debug, PartialEq)]
enum Event {
    Raw(String),
    Record(Geomessage),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn raw_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Raw(_)))
            .count()
    }

    fn records(&self) -> Vec<Geomessage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Record(message) => Some(message),
                Event::Raw(_) => None,
            })
            .collect()
    }
}

impl GeomessageListener for Recorder {
    fn on_raw(&self, contents: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Raw(contents.to_string()));
    }

    fn on_geomessage(&self, message: &Geomessage) {
        self.events
            .lock()
            .unwrap()
            .push(Event::Record(message.clone()));
    }
}

fn inject(port: u16, payload: &str) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .send_to(payload.as_bytes(), ("127.0.0.1", port))
        .unwrap();
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

const TWO_RECORDS: &str = "<geomessages>\
    <geomessage v=\"1.0\"><_id>A</_id><uniquedesignation>3A1-001</uniquedesignation></geomessage>\
    <geomessage v=\"1.0\"><_id>B</_id><uniquedesignation>3A2-002</uniquedesignation></geomessage>\
    </geomessages>";

#[tokio::test(flavor = "multi_thread")]
async fn multi_record_datagram_fans_out_in_order() {
    let controller = MessageController::bind(48211).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    controller.add_listener(recorder.clone());
    controller.start_receiving().unwrap();

    inject(48211, TWO_RECORDS);
    assert!(wait_until(|| recorder.events().len() >= 3).await);

    let events = recorder.events();
    assert_eq!(events.len(), 3);
    // raw first, then the records in document order
    assert_eq!(events[0], Event::Raw(TWO_RECORDS.to_string()));
    let records = recorder.records();
    assert_eq!(records[0].id(), "A");
    assert_eq!(records[1].id(), "B");
    assert_eq!(records[0].field(UNIQUE_DESIGNATION_FIELD), Some("3A1-001"));

    controller.stop_receiving();
}

#[tokio::test(flavor = "multi_thread")]
async fn own_position_reports_are_suppressed_on_receive() {
    let controller = MessageController::bind(48212).await.unwrap();
    controller.set_sender_identity(Some("3A1-001".to_string()));
    let recorder = Arc::new(Recorder::default());
    controller.add_listener(recorder.clone());
    controller.start_receiving().unwrap();

    let own = "<geomessages><geomessage v=\"1.0\">\
        <_id>A</_id><_type>position_report</_type>\
        <uniquedesignation>3A1-001</uniquedesignation>\
        </geomessage></geomessages>";
    inject(48212, own);
    assert!(wait_until(|| recorder.raw_count() == 1).await);
    assert!(recorder.records().is_empty());

    let peer = own.replace("3A1-001", "3A2-002");
    inject(48212, &peer);
    assert!(wait_until(|| recorder.records().len() == 1).await);
    assert_eq!(recorder.raw_count(), 2);
    let records = recorder.records();
    assert_eq!(records[0].field(UNIQUE_DESIGNATION_FIELD), Some("3A2-002"));

    controller.stop_receiving();
}

#[tokio::test(flavor = "multi_thread")]
async fn chem_light_send_loops_back_synchronously() {
    let controller = MessageController::bind(48989).await.unwrap();
    controller.set_sender_identity(Some("3A1-001".to_string()));
    let recorder = Arc::new(Recorder::default());
    controller.add_listener(recorder.clone());

    // the loopback must have happened by the time the call returns, whether
    // or not any interface accepted the broadcast
    let _ = controller.send_chem_light(12.0, 34.0, 4326, 0xFFFF0000).await;

    let records = recorder.records();
    assert_eq!(records.len(), 1);
    let light = &records[0];
    assert_eq!(light.field(TYPE_FIELD), Some("chemlight"));
    assert_eq!(light.field(CONTROL_POINTS_FIELD), Some("12.0,34.0"));
    assert_eq!(light.field("color"), Some("1"));
    assert_eq!(light.field(ACTION_FIELD), Some("UPDATE"));
    assert_eq!(light.field(UNIQUE_DESIGNATION_FIELD), Some(light.id()));
    // no raw event is synthesized for local sends
    assert_eq!(recorder.raw_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn self_ignored_types_do_not_loop_back_on_send() {
    let controller = MessageController::bind(48213).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    controller.add_listener(recorder.clone());

    let mut report = Geomessage::with_id("uid-1");
    report.set_field(TYPE_FIELD, "position_report");
    report.set_field(UNIQUE_DESIGNATION_FIELD, "someone else");
    let _ = controller.send_geomessage(&report).await;
    assert!(recorder.records().is_empty());

    // the external alias is equally ignored
    let mut track = Geomessage::with_id("uid-2");
    track.set_field(TYPE_FIELD, "trackrep");
    let _ = controller.send_geomessage(&track).await;
    assert!(recorder.records().is_empty());

    let mut spot = Geomessage::with_id("uid-3");
    spot.set_field(TYPE_FIELD, "spot_report");
    let _ = controller.send_geomessage(&spot).await;
    assert_eq!(recorder.records().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn non_xml_text_is_raw_only_and_malformed_xml_is_counted() {
    let controller = MessageController::bind(48214).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    controller.add_listener(recorder.clone());
    controller.start_receiving().unwrap();

    inject(48214, "Test message, nothing like XML");
    assert!(wait_until(|| recorder.raw_count() == 1).await);
    assert!(recorder.records().is_empty());
    assert_eq!(controller.decode_error_count(), 0);

    inject(48214, "<geomessages><geomessage v=\"1.0\"><_id>A</wrong>");
    assert!(wait_until(|| recorder.raw_count() == 2).await);
    assert!(recorder.records().is_empty());
    assert_eq!(controller.decode_error_count(), 1);

    controller.stop_receiving();
}

#[tokio::test(flavor = "multi_thread")]
async fn set_port_rebinds_the_receive_socket() {
    let controller = MessageController::bind(48215).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    controller.add_listener(recorder.clone());
    controller.start_receiving().unwrap();

    controller.set_port(48216).unwrap();
    assert!(controller.is_receiving());
    // socket teardown on the old port may still be in flight; keep trying
    // the new port until a datagram lands
    let delivered = wait_until(|| {
        inject(48216, TWO_RECORDS);
        !recorder.events().is_empty()
    })
    .await;
    assert!(delivered);

    controller.stop_receiving();
}

#[tokio::test(flavor = "multi_thread")]
async fn stopped_receiver_delivers_nothing() {
    let controller = MessageController::bind(48217).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    controller.add_listener(recorder.clone());
    controller.start_receiving().unwrap();
    controller.stop_receiving();

    tokio::time::sleep(Duration::from_millis(50)).await;
    inject(48217, TWO_RECORDS);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(recorder.events().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn removed_listeners_stop_receiving_new_datagrams() {
    let controller = MessageController::bind(48218).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    let listener: Arc<dyn GeomessageListener> = recorder.clone();
    assert!(controller.add_listener(listener.clone()));
    assert!(!controller.add_listener(listener.clone()));
    controller.start_receiving().unwrap();

    inject(48218, TWO_RECORDS);
    assert!(wait_until(|| recorder.raw_count() == 1).await);

    assert!(controller.remove_listener(&listener));
    assert!(!controller.remove_listener(&listener));
    inject(48218, TWO_RECORDS);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.raw_count(), 1);

    controller.stop_receiving();
}

#[tokio::test(flavor = "multi_thread")]
async fn oversized_payloads_are_rejected() {
    let controller = MessageController::bind(48219).await.unwrap();
    let oversized = vec![b'x'; geomessage_broadcast::MAX_MESSAGE_LENGTH + 1];
    assert!(matches!(
        controller.send(&oversized).await,
        Err(geomessage_broadcast::SendError::PayloadTooLarge(_))
    ));
}
