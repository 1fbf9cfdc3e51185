use super::*;
use std::io::Cursor;

// -------------------- Credential --------------------

#[test]
fn from_email_password_lowercases_and_splits() {
    let cred = Credential::from_email_password("Alice@Example.COM", "hunter2").unwrap();
    assert_eq!(cred.email, "alice@example.com");
    assert_eq!(cred.user, "alice");
    assert_eq!(cred.domain, "example.com");
    assert_eq!(cred.password, "hunter2");
}

#[test]
fn from_email_password_requires_at_sign() {
    assert!(Credential::from_email_password("not-an-email", "pw").is_none());
}

#[test]
fn field_selects_by_key() {
    let cred = Credential::from_email_password("a@b.io", "pw").unwrap();
    assert_eq!(cred.field(IndexKey::Email), "a@b.io");
    assert_eq!(cred.field(IndexKey::User), "a");
    assert_eq!(cred.field(IndexKey::Domain), "b.io");
    assert_eq!(cred.field(IndexKey::Password), "pw");
}

#[test]
fn json_roundtrip() {
    let cred = Credential::from_email_password("a@b.io", "pw").unwrap();
    let line = serde_json::to_string(&cred).unwrap();
    let back: Credential = serde_json::from_str(&line).unwrap();
    assert_eq!(back, cred);
}

#[test]
fn partial_json_decodes_with_empty_fields() {
    let cred: Credential = serde_json::from_str(r#"{"email":"a@b.io"}"#).unwrap();
    assert_eq!(cred.email, "a@b.io");
    assert_eq!(cred.user, "");
    assert_eq!(cred.password, "");
}

// -------------------- IndexKey --------------------

#[test]
fn key_names_roundtrip() {
    for key in IndexKey::ALL {
        assert_eq!(key.name().parse::<IndexKey>().unwrap(), key);
    }
}

#[test]
fn unknown_key_is_an_error() {
    let err = "md5".parse::<IndexKey>().unwrap_err();
    assert_eq!(err.to_string(), "invalid index key 'md5'");
}

// -------------------- read_line_at --------------------

#[test]
fn read_line_at_offsets() {
    let data = b"first\nsecond\nthird\n";
    let mut cursor = Cursor::new(data.to_vec());
    assert_eq!(read_line_at(&mut cursor, 0).unwrap(), "first");
    assert_eq!(read_line_at(&mut cursor, 6).unwrap(), "second");
    assert_eq!(read_line_at(&mut cursor, 13).unwrap(), "third");
}

#[test]
fn read_line_at_handles_missing_terminator() {
    let mut cursor = Cursor::new(b"only".to_vec());
    assert_eq!(read_line_at(&mut cursor, 0).unwrap(), "only");
}
