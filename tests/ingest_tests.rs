//! Integration tests for the email ingestion pipeline.

use chrono::{TimeZone, Utc};

use mailslot::error::MailslotError;
use mailslot::inbox;
use mailslot::ingest::{message_id, Delivery, DropReason, Envelope, Ingestor, Outcome};
use mailslot::model::address::Sender;
use mailslot::model::mailbox::{MailboxKey, MessageMode};
use mailslot::model::message::InboxMessage;
use mailslot::parser::encoding::decode_quoted_printable;
use mailslot::parser::mime::{extract_body, EMPTY_BODY_PLACEHOLDER, MAX_CONTENT_CHARS, TRUNCATION_MARKER};
use mailslot::store::{FilesystemStore, MemoryStore, ObjectStore};

const DOMAIN: &str = "xablau.email";

fn allowed() -> Vec<String> {
    vec![DOMAIN.to_string()]
}

fn mailbox_key() -> MailboxKey {
    MailboxKey::new(DOMAIN, "ana.souza").unwrap()
}

/// A store holding one existing mailbox.
fn store_with_mailbox() -> MemoryStore {
    let store = MemoryStore::new();
    inbox::create_mailbox(&store, &mailbox_key(), MessageMode::Identified, Utc::now()).unwrap();
    store
}

fn delivery(raw: &str, transport_id: Option<&str>) -> Delivery {
    Delivery {
        envelope: Envelope {
            recipient: format!("ana.souza@{DOMAIN}"),
            sender: "bounces@relay.example".to_string(),
        },
        raw: raw.as_bytes().to_vec(),
        transport_id: transport_id.map(str::to_string),
    }
}

fn alternative(first: (&str, &str), second: (&str, &str)) -> String {
    format!(
        "Content-Type: multipart/alternative; boundary=\"b1\"\r\n\r\n\
--b1\r\nContent-Type: {}\r\n\r\n{}\r\n\
--b1\r\nContent-Type: {}\r\n\r\n{}\r\n\
--b1--\r\n",
        first.0, first.1, second.0, second.1
    )
}

fn stored(store: &MemoryStore) -> Vec<InboxMessage> {
    inbox::list_messages(store, &mailbox_key()).unwrap()
}

// ─── End to end ─────────────────────────────────────────────────────

#[test]
fn test_end_to_end_multipart_alternative() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    let raw = format!(
        "From: \"A B\" <a@b.com>\r\nSubject: Hi\r\n{}",
        alternative(
            ("text/plain", "Hello world"),
            ("text/html", "<p>Hello <b>world</b></p>")
        )
    );
    let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 15, 0).unwrap();

    let outcome = ingestor
        .ingest_at(&delivery(&raw, Some("ses-0001")), now)
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Stored {
            key: "xablau.email/ana.souza/messages/ses-0001.json".to_string(),
            id: "ses-0001".to_string(),
        }
    );

    let messages = stored(&store);
    assert_eq!(messages.len(), 1);
    let InboxMessage::Email(email) = &messages[0] else {
        panic!("expected an email message");
    };
    assert_eq!(email.common.content, "Hello world");
    assert_eq!(email.from, "a@b.com");
    assert_eq!(email.from_name, "A B");
    assert_eq!(email.subject, "Hi");
    assert_eq!(email.reply_to, "a@b.com");
    assert!(!email.common.is_read);
    assert_eq!(email.common.created_at, now);
    assert_eq!(messages[0].source(), "email");
}

#[test]
fn test_stored_json_shape() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    ingestor
        .ingest(&delivery("Subject: x\r\n\r\nbody", Some("id-1")))
        .unwrap();

    let bytes = store
        .get("xablau.email/ana.souza/messages/id-1.json")
        .unwrap()
        .unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["source"], "email");
    assert_eq!(value["isRead"], false);
    assert_eq!(value["content"], "body");
    assert!(value["createdAt"].as_str().unwrap().ends_with('Z'));
    assert_eq!(
        store
            .content_type("xablau.email/ana.souza/messages/id-1.json")
            .as_deref(),
        Some("application/json")
    );
}

#[test]
fn test_missing_from_uses_envelope_sender() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    ingestor
        .ingest(&delivery("Subject: none\r\n\r\nhello", None))
        .unwrap();
    let messages = stored(&store);
    let email = messages[0].as_email().unwrap();
    assert_eq!(email.from, "bounces@relay.example");
    assert_eq!(email.from_name, "bounces");
}

// ─── Idempotency ────────────────────────────────────────────────────

#[test]
fn test_redelivery_with_same_transport_id_overwrites() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    let d = delivery("Subject: retry\r\n\r\nsame message", Some("<CAF=x+y@mail.example>"));

    let first = ingestor.ingest(&d).unwrap();
    let second = ingestor.ingest(&d).unwrap();
    assert_eq!(first, second);
    assert_eq!(stored(&store).len(), 1);
}

#[test]
fn test_commit_key_depends_only_on_transport_id() {
    let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();
    let key = mailbox_key();
    for transport_id in ["abc123", "<weird id/with@chars>", "0100018f-aa"] {
        assert_eq!(
            key.message_key(&message_id(Some(transport_id), t1)),
            key.message_key(&message_id(Some(transport_id), t2)),
        );
    }
}

#[test]
fn test_without_transport_id_each_delivery_is_new() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    let d = delivery("Subject: a\r\n\r\nnote", None);
    ingestor.ingest(&d).unwrap();
    ingestor.ingest(&d).unwrap();
    assert_eq!(stored(&store).len(), 2);
}

// ─── Mailbox gate ───────────────────────────────────────────────────

#[test]
fn test_unknown_mailbox_is_dropped_without_writes() {
    let store = MemoryStore::new();
    let ingestor = Ingestor::new(&store, allowed());
    let outcome = ingestor
        .ingest(&delivery("Subject: hi\r\n\r\nbody", Some("x1")))
        .unwrap();
    assert_eq!(outcome, Outcome::Dropped(DropReason::MailboxNotFound(mailbox_key())));
    assert!(store.is_empty());
}

#[test]
fn test_disallowed_domain_is_dropped() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    let mut d = delivery("Subject: hi\r\n\r\nbody", None);
    d.envelope.recipient = "ana.souza@elsewhere.com".to_string();
    assert_eq!(
        ingestor.ingest(&d).unwrap(),
        Outcome::Dropped(DropReason::DomainNotAllowed("elsewhere.com".to_string()))
    );
    d.envelope.recipient = "not-an-address".to_string();
    assert!(matches!(
        ingestor.ingest(&d).unwrap(),
        Outcome::Dropped(DropReason::InvalidRecipient(_))
    ));
    assert!(stored(&store).is_empty());
}

#[test]
fn test_recipient_case_is_normalized() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    let mut d = delivery("Subject: hi\r\n\r\nbody", Some("case-1"));
    d.envelope.recipient = "Ana.Souza@Xablau.Email".to_string();
    assert!(matches!(ingestor.ingest(&d).unwrap(), Outcome::Stored { .. }));
}

#[test]
fn test_store_outage_is_an_error() {
    let store = store_with_mailbox();
    store.set_unavailable(true);
    let ingestor = Ingestor::new(&store, allowed());
    let err = ingestor
        .ingest(&delivery("Subject: hi\r\n\r\nbody", None))
        .unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(err, MailslotError::Storage { .. }));
}

#[test]
fn test_commit_failure_is_an_error() {
    let store = store_with_mailbox();
    store.set_read_only(true);
    let ingestor = Ingestor::new(&store, allowed());
    let err = ingestor
        .ingest(&delivery("Subject: hi\r\n\r\nbody", Some("w-1")))
        .unwrap_err();
    assert!(err.is_transient());
    store.set_read_only(false);
    assert!(stored(&store).is_empty());
    assert!(store
        .get("xablau.email/ana.souza/messages/w-1.json")
        .unwrap()
        .is_none());
}

#[test]
fn test_recipient_the_store_refuses_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemStore::open(dir.path()).unwrap();
    let ingestor = Ingestor::new(&store, allowed());
    let mut d = delivery("Subject: hi\r\n\r\nbody", None);
    d.envelope.recipient = format!("box.tmp-1@{DOMAIN}");
    assert_eq!(
        ingestor.ingest(&d).unwrap(),
        Outcome::Dropped(DropReason::InvalidRecipient(format!("box.tmp-1@{DOMAIN}")))
    );
}

// ─── Body extraction ────────────────────────────────────────────────

#[test]
fn test_plain_text_preferred_in_either_order() {
    let plain_first = alternative(("text/plain", "A"), ("text/html", "<b>B</b>"));
    let html_first = alternative(("text/html", "<b>B</b>"), ("text/plain", "A"));
    assert_eq!(extract_body(plain_first.as_bytes()), "A");
    assert_eq!(extract_body(html_first.as_bytes()), "A");
}

#[test]
fn test_untyped_part_is_read_as_plain_text() {
    let store = store_with_mailbox();
    let ingestor = Ingestor::new(&store, allowed());
    let raw = "Subject: bare\r\nContent-Type: multipart/mixed; boundary=\"m\"\r\n\r\n\
--m\r\n\r\nNo headers on this part\r\n\
--m\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4\r\n--m--\r\n";
    ingestor.ingest(&delivery(raw, Some("bare-1"))).unwrap();
    let messages = stored(&store);
    assert_eq!(messages[0].content(), "No headers on this part");
}

#[test]
fn test_html_only_part_is_stripped() {
    let raw = "Content-Type: multipart/alternative; boundary=\"b1\"\r\n\r\n\
--b1\r\nContent-Type: text/html; charset=utf-8\r\n\r\n\
<p>Hello</p><script>evil()</script>\r\n--b1--\r\n";
    let text = extract_body(raw.as_bytes());
    assert!(text.contains("Hello"));
    assert!(!text.contains("evil"));
    assert!(!text.contains('<') && !text.contains('>'));
}

#[test]
fn test_body_is_bounded_and_non_empty() {
    let long = format!("Subject: x\r\n\r\n{}", "word ".repeat(3000));
    let inputs: Vec<Vec<u8>> = vec![
        Vec::new(),
        b"\r\n\r\n".to_vec(),
        b"Subject: headers only".to_vec(),
        b"Subject: x\r\n\r\n".to_vec(),
        vec![0xff, 0xfe, 0x00, 0x80, 0x0a, 0x0a, 0xc3],
        b"Content-Type: multipart/mixed; boundary=q\r\n\r\n--q\r\n--q--".to_vec(),
        long.into_bytes(),
    ];
    let limit = MAX_CONTENT_CHARS + TRUNCATION_MARKER.chars().count();
    for input in &inputs {
        let text = extract_body(input);
        assert!(!text.is_empty(), "empty output for {input:?}");
        assert!(text.chars().count() <= limit);
    }
    assert_eq!(extract_body(b""), EMPTY_BODY_PLACEHOLDER);
}

#[test]
fn test_quoted_printable_decoding() {
    let decoded = decode_quoted_printable(b"Caf=C3=A9");
    assert_eq!(String::from_utf8(decoded).unwrap(), "Café");
    assert_eq!(decode_quoted_printable(b"line1=\r\nline2"), b"line1line2");
}

#[test]
fn test_from_header_parsing() {
    let named = Sender::parse("\"Jane Doe\" <jane@x.com>");
    assert_eq!((named.address.as_str(), named.display_name.as_str()), ("jane@x.com", "Jane Doe"));
    let bare = Sender::parse("jane@x.com");
    assert_eq!((bare.address.as_str(), bare.display_name.as_str()), ("jane@x.com", "jane"));
}

// ─── Filesystem backend ─────────────────────────────────────────────

#[test]
fn test_ingest_into_filesystem_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = FilesystemStore::open(dir.path()).unwrap();
    inbox::create_mailbox(&store, &mailbox_key(), MessageMode::Identified, Utc::now()).unwrap();

    let ingestor = Ingestor::new(&store, allowed());
    let raw = "From: Ana <ana@example.org>\nSubject: Oi\n\
Content-Type: text/plain; charset=utf-8\nContent-Transfer-Encoding: quoted-printable\n\n\
Ol=C3=A1, tudo bem?\n";
    ingestor.ingest(&delivery(raw, Some("fs-1"))).unwrap();

    assert!(dir
        .path()
        .join("xablau.email/ana.souza/messages/fs-1.json")
        .exists());
    let messages = inbox::list_messages(&store, &mailbox_key()).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content(), "Olá, tudo bem?");
    assert_eq!(messages[0].as_email().unwrap().from_name, "Ana");
}
