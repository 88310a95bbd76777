//! DIMSE service exchanges over a local TCP loopback.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use radlink_core::{tags, uids};
use radlink_dimse::scp::ScpBuilder;
use radlink_dimse::scu::{self, FindResponse};
use radlink_dimse::{CancellationToken, Priority, Status};
use radlink_object::InMemObject;
use radlink_ul::association::ClientAssociationOptions;

fn spawn_scp(
    listener: TcpListener,
    scp: radlink_dimse::scp::Scp,
    associations: usize,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for _ in 0..associations {
            let (stream, _) = listener.accept().unwrap();
            scp.handle(stream).unwrap();
        }
    })
}

#[test]
fn c_echo_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp = ScpBuilder::new("TEAMPACS").build();
    let server = spawn_scp(listener, scp, 1);

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title("MAYAM")
        .called_ae_title("TEAMPACS")
        .with_abstract_syntax(uids::VERIFICATION)
        .establish(addr)
        .unwrap();

    let outcome = scu::echo(&mut association, 1).unwrap();
    assert_eq!(outcome.status, Status::SUCCESS);
    assert!(outcome.round_trip.as_nanos() > 0);

    association.release().unwrap();
    server.join().unwrap();
}

fn secondary_capture_object() -> InMemObject {
    let mut obj = InMemObject::new();
    obj.set_string(tags::SOP_CLASS_UID, uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
        .unwrap();
    obj.set_string(tags::SOP_INSTANCE_UID, "1.2.3.4.1.1").unwrap();
    obj.set_string(tags::STUDY_INSTANCE_UID, "1.2.3.4").unwrap();
    obj.set_string(tags::SERIES_INSTANCE_UID, "1.2.3.4.1").unwrap();
    obj.set_string(tags::PATIENT_NAME, "TEST^PATIENT").unwrap();
    obj.set_string(tags::PATIENT_ID, "12345").unwrap();
    obj.set_int(tags::ROWS, 1).unwrap();
    obj.set_int(tags::COLUMNS, 1).unwrap();
    obj.set_int(tags::BITS_ALLOCATED, 8).unwrap();
    obj.set_bytes(tags::PIXEL_DATA, vec![0x80, 0x00]).unwrap();
    obj
}

#[test]
fn c_store_delivers_the_object() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let received: Arc<Mutex<Vec<InMemObject>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let scp = ScpBuilder::new("TEAMPACS")
        .with_storage_class(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
        .on_store(move |context, object| {
            assert_eq!(context.calling_ae_title, "MAYAM");
            assert_eq!(context.sop_instance_uid, "1.2.3.4.1.1");
            sink.lock().unwrap().push(object);
            Status::SUCCESS
        })
        .build();
    let server = spawn_scp(listener, scp, 1);

    let object = secondary_capture_object();
    let mut association = ClientAssociationOptions::new()
        .calling_ae_title("MAYAM")
        .called_ae_title("TEAMPACS")
        .with_abstract_syntax(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
        .establish(addr)
        .unwrap();

    let status = scu::store(&mut association, &object, 1, Priority::Medium).unwrap();
    assert_eq!(status, Status::SUCCESS);

    association.release().unwrap();
    server.join().unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0], object);
}

#[test]
fn c_find_yields_pending_matches_in_order() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let scp = ScpBuilder::new("TEAMPACS")
        .with_query_class(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
        .on_find(|_query| {
            (1..=3)
                .map(|i| {
                    let mut m = InMemObject::new();
                    m.set_string(tags::STUDY_INSTANCE_UID, format!("1.2.3.{}", i))
                        .unwrap();
                    m
                })
                .collect()
        })
        .build();
    let server = spawn_scp(listener, scp, 1);

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title("MAYAM")
        .called_ae_title("TEAMPACS")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
        .establish(addr)
        .unwrap();

    let mut query = InMemObject::new();
    query.set_string(tags::QUERY_RETRIEVE_LEVEL, "STUDY").unwrap();
    query.set_string(tags::STUDY_INSTANCE_UID, "").unwrap();

    let responses: Vec<_> = scu::find(
        &mut association,
        uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND,
        &query,
        1,
        CancellationToken::new(),
    )
    .unwrap()
    .collect::<Result<_, _>>()
    .unwrap();

    assert_eq!(responses.len(), 4);
    for (i, response) in responses[..3].iter().enumerate() {
        match response {
            FindResponse::Pending { status, identifier } => {
                assert_eq!(*status, Status::PENDING);
                assert_eq!(
                    identifier
                        .get(tags::STUDY_INSTANCE_UID)
                        .unwrap()
                        .to_str()
                        .unwrap(),
                    format!("1.2.3.{}", i + 1)
                );
            }
            other => panic!("expected a pending response, got {:?}", other),
        }
    }
    assert_eq!(
        responses[3],
        FindResponse::Final {
            status: Status::SUCCESS
        }
    );

    association.release().unwrap();
    server.join().unwrap();
}
