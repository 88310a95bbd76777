//! Association negotiation and data transfer over a local TCP loopback.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;

use radlink_ul::association::client::ClientAssociationOptions;
use radlink_ul::association::server::ServerAssociationOptions;
use radlink_ul::pdu::Pdu;

static VERIFICATION: &str = "1.2.840.10008.1.1";

#[test]
fn establish_exchange_release() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut association = ServerAssociationOptions::new()
            .ae_title("TEAMPACS")
            .with_abstract_syntax(VERIFICATION)
            .establish(stream)
            .unwrap();
        assert_eq!(association.client_ae_title(), "MAYAM");

        // receive one message and echo the bytes back
        let mut message = Vec::new();
        {
            let mut reader = association.receive_pdata();
            reader.read_to_end(&mut message).unwrap();
        }
        {
            let mut writer = association.send_pdata(1);
            writer.write_all(&message).unwrap();
            writer.finish().unwrap();
        }

        // then expect an orderly release
        match association.receive().unwrap() {
            Pdu::ReleaseRQ => {}
            pdu => panic!("unexpected {:?}", pdu),
        }
        association.send(&Pdu::ReleaseRP).unwrap();
        message
    });

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title("MAYAM")
        .called_ae_title("TEAMPACS")
        .with_abstract_syntax(VERIFICATION)
        .establish(addr)
        .unwrap();

    let contexts = association.presentation_contexts();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].id, 1);
    assert_eq!(contexts[0].transfer_syntax, "1.2.840.10008.1.2.1");

    let payload: Vec<u8> = (0..40_000u32).map(|x| (x % 255) as u8).collect();
    {
        let mut writer = association.send_pdata(1);
        writer.write_all(&payload).unwrap();
        writer.finish().unwrap();
    }
    let mut echoed = Vec::new();
    {
        let mut reader = association.receive_pdata();
        reader.read_to_end(&mut echoed).unwrap();
    }
    assert_eq!(echoed, payload);

    association.release().unwrap();
    let server_copy = server.join().unwrap();
    assert_eq!(server_copy, payload);
}

#[test]
fn wrong_called_ae_title_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let result = ServerAssociationOptions::new()
            .ae_title("TEAMPACS")
            .with_abstract_syntax(VERIFICATION)
            .establish(stream);
        assert!(result.is_err());
    });

    let result = ClientAssociationOptions::new()
        .calling_ae_title("MAYAM")
        .called_ae_title("NOBODY")
        .with_abstract_syntax(VERIFICATION)
        .establish(addr);
    assert!(matches!(
        result,
        Err(radlink_ul::association::client::Error::Rejected { .. })
    ));
    server.join().unwrap();
}

#[test]
fn unsupported_abstract_syntax_accepts_nothing() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        // the association itself is established,
        // but every context is refused
        let _ = ServerAssociationOptions::new()
            .ae_title("TEAMPACS")
            .accept_any()
            .with_abstract_syntax("1.2.840.10008.5.1.4.1.1.7")
            .establish(stream);
    });

    let result = ClientAssociationOptions::new()
        .called_ae_title("TEAMPACS")
        .with_abstract_syntax(VERIFICATION)
        .establish(addr);
    assert!(matches!(
        result,
        Err(radlink_ul::association::client::Error::NoAcceptedPresentationContexts { .. })
    ));
    server.join().unwrap();
}
