//! Canonical binary codec.
//!
//! The on-disk cache and the integrity hash both operate on a canonical byte
//! encoding of fully resolved expressions. The encoding is a byte-level JSON
//! emission with a closed tag universe, fixed key order per constructor, and
//! record fields ordered by label regardless of how they were declared, so
//! structurally equal expressions produce byte-equal encodings. Decoding is
//! strict: unknown tags, missing fields, extra keys, and out-of-order or
//! duplicate record labels are all rejected.

use serde_json::Value as Json;

use crate::ast::{Const, Expr, Var};

/// Selects the encoding variant. The protocol version is part of every
/// session and of the hash utility's input contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    #[default]
    V1,
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Hash input and cache entries must be fully resolved.
    #[error("cannot encode an expression that still contains imports")]
    UnresolvedImport,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("not a canonical expression encoding")]
    Malformed,
    #[error("unknown constructor tag '{0}'")]
    UnknownTag(String),
    #[error("malformed '{0}' node")]
    BadNode(&'static str),
}

/// Encode a fully resolved expression to its canonical byte sequence.
pub fn encode_expression(version: ProtocolVersion, expr: &Expr) -> Result<Vec<u8>, EncodeError> {
    match version {
        ProtocolVersion::V1 => {
            let mut out = Vec::new();
            encode_v1(&mut out, expr)?;
            Ok(out)
        }
    }
}

/// Decode a canonical byte sequence back into an expression.
pub fn decode_expression(version: ProtocolVersion, bytes: &[u8]) -> Result<Expr, DecodeError> {
    match version {
        ProtocolVersion::V1 => {
            let json: Json = serde_json::from_slice(bytes).map_err(|_| DecodeError::Malformed)?;
            decode_v1(&json)
        }
    }
}

// ── V1 encoder ───────────────────────────────────────────────────────

fn encode_v1(out: &mut Vec<u8>, expr: &Expr) -> Result<(), EncodeError> {
    match expr {
        Expr::Const(Const::Type) => out.extend_from_slice(br#"{"t":"const","v":"Type"}"#),
        Expr::Const(Const::Kind) => out.extend_from_slice(br#"{"t":"const","v":"Kind"}"#),
        Expr::Var(v) => {
            out.extend_from_slice(br#"{"t":"var","x":"#);
            emit_json_string(out, &v.name);
            out.extend_from_slice(br#","i":"#);
            out.extend_from_slice(v.index.to_string().as_bytes());
            out.push(b'}');
        }
        Expr::Lam(x, a, b) => encode_binder(out, "lam", x, a, b)?,
        Expr::Pi(x, a, b) => encode_binder(out, "pi", x, a, b)?,
        Expr::App(f, a) => {
            out.extend_from_slice(br#"{"t":"app","f":"#);
            encode_v1(out, f)?;
            out.extend_from_slice(br#","a":"#);
            encode_v1(out, a)?;
            out.push(b'}');
        }
        Expr::Let(x, t, v, b) => {
            out.extend_from_slice(br#"{"t":"let","x":"#);
            emit_json_string(out, x);
            out.extend_from_slice(br#","a":"#);
            match t {
                Some(t) => encode_v1(out, t)?,
                None => out.extend_from_slice(b"null"),
            }
            out.extend_from_slice(br#","v":"#);
            encode_v1(out, v)?;
            out.extend_from_slice(br#","b":"#);
            encode_v1(out, b)?;
            out.push(b'}');
        }
        Expr::Annot(e, t) => {
            out.extend_from_slice(br#"{"t":"annot","e":"#);
            encode_v1(out, e)?;
            out.extend_from_slice(br#","a":"#);
            encode_v1(out, t)?;
            out.push(b'}');
        }
        Expr::Bool => out.extend_from_slice(br#"{"t":"bool"}"#),
        Expr::BoolLit(b) => {
            out.extend_from_slice(br#"{"t":"boollit","v":"#);
            out.extend_from_slice(if *b { b"true" } else { b"false" });
            out.push(b'}');
        }
        Expr::BoolAnd(l, r) => encode_operator(out, "and", l, r)?,
        Expr::BoolOr(l, r) => encode_operator(out, "or", l, r)?,
        Expr::BoolEq(l, r) => encode_operator(out, "eq", l, r)?,
        Expr::Integer => out.extend_from_slice(br#"{"t":"integer"}"#),
        Expr::IntegerLit(n) => {
            // canonical decimal string, so the byte form never depends on a
            // number formatter
            out.extend_from_slice(br#"{"t":"integerlit","v":"#);
            emit_json_string(out, &n.to_string());
            out.push(b'}');
        }
        Expr::Text => out.extend_from_slice(br#"{"t":"text"}"#),
        Expr::TextLit(s) => {
            out.extend_from_slice(br#"{"t":"textlit","v":"#);
            emit_json_string(out, s);
            out.push(b'}');
        }
        Expr::List => out.extend_from_slice(br#"{"t":"list"}"#),
        Expr::ListLit(t, xs) => {
            out.extend_from_slice(br#"{"t":"listlit","a":"#);
            match t {
                Some(t) => encode_v1(out, t)?,
                None => out.extend_from_slice(b"null"),
            }
            out.extend_from_slice(br#","v":["#);
            for (i, x) in xs.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                encode_v1(out, x)?;
            }
            out.extend_from_slice(b"]}");
        }
        Expr::RecordType(fields) => encode_fields(out, "record", fields)?,
        Expr::RecordLit(fields) => encode_fields(out, "recordlit", fields)?,
        Expr::Field(e, k) => {
            out.extend_from_slice(br#"{"t":"field","e":"#);
            encode_v1(out, e)?;
            out.extend_from_slice(br#","k":"#);
            emit_json_string(out, k);
            out.push(b'}');
        }
        Expr::ImportAlt(..) | Expr::Embed(_) => return Err(EncodeError::UnresolvedImport),
    }
    Ok(())
}

fn encode_binder(
    out: &mut Vec<u8>,
    tag: &str,
    x: &str,
    a: &Expr,
    b: &Expr,
) -> Result<(), EncodeError> {
    out.extend_from_slice(br#"{"t":"#);
    emit_json_string(out, tag);
    out.extend_from_slice(br#","x":"#);
    emit_json_string(out, x);
    out.extend_from_slice(br#","d":"#);
    encode_v1(out, a)?;
    out.extend_from_slice(br#","b":"#);
    encode_v1(out, b)?;
    out.push(b'}');
    Ok(())
}

fn encode_operator(out: &mut Vec<u8>, tag: &str, l: &Expr, r: &Expr) -> Result<(), EncodeError> {
    out.extend_from_slice(br#"{"t":"#);
    emit_json_string(out, tag);
    out.extend_from_slice(br#","l":"#);
    encode_v1(out, l)?;
    out.extend_from_slice(br#","r":"#);
    encode_v1(out, r)?;
    out.push(b'}');
    Ok(())
}

fn encode_fields(
    out: &mut Vec<u8>,
    tag: &str,
    fields: &[(String, Expr)],
) -> Result<(), EncodeError> {
    // fields are stored in declaration order; the encoding orders them by
    // label so the byte form is canonical
    let mut ordered: Vec<&(String, Expr)> = fields.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    out.extend_from_slice(br#"{"t":"#);
    emit_json_string(out, tag);
    out.extend_from_slice(br#","v":["#);
    for (i, (k, v)) in ordered.into_iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        out.push(b'[');
        emit_json_string(out, k);
        out.push(b',');
        encode_v1(out, v)?;
        out.push(b']');
    }
    out.extend_from_slice(b"]}");
    Ok(())
}

fn emit_json_string(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\t' => out.extend_from_slice(b"\\t"),
            '\r' => out.extend_from_slice(b"\\r"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes())
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

// ── V1 decoder ───────────────────────────────────────────────────────

fn decode_v1(json: &Json) -> Result<Expr, DecodeError> {
    let obj = json.as_object().ok_or(DecodeError::Malformed)?;
    let tag = obj
        .get("t")
        .and_then(Json::as_str)
        .ok_or(DecodeError::Malformed)?;
    match tag {
        "const" => {
            require_keys(obj, &["t", "v"], "const")?;
            match obj.get("v").and_then(Json::as_str) {
                Some("Type") => Ok(Expr::Const(Const::Type)),
                Some("Kind") => Ok(Expr::Const(Const::Kind)),
                _ => Err(DecodeError::BadNode("const")),
            }
        }
        "var" => {
            require_keys(obj, &["t", "x", "i"], "var")?;
            let name = expect_str(obj, "x", "var")?;
            let index = obj
                .get("i")
                .and_then(Json::as_u64)
                .ok_or(DecodeError::BadNode("var"))? as usize;
            Ok(Expr::Var(Var::new(name, index)))
        }
        "lam" => {
            require_keys(obj, &["t", "x", "d", "b"], "lam")?;
            Ok(Expr::Lam(
                expect_str(obj, "x", "lam")?,
                Box::new(decode_v1(expect_key(obj, "d", "lam")?)?),
                Box::new(decode_v1(expect_key(obj, "b", "lam")?)?),
            ))
        }
        "pi" => {
            require_keys(obj, &["t", "x", "d", "b"], "pi")?;
            Ok(Expr::Pi(
                expect_str(obj, "x", "pi")?,
                Box::new(decode_v1(expect_key(obj, "d", "pi")?)?),
                Box::new(decode_v1(expect_key(obj, "b", "pi")?)?),
            ))
        }
        "app" => {
            require_keys(obj, &["t", "f", "a"], "app")?;
            Ok(Expr::App(
                Box::new(decode_v1(expect_key(obj, "f", "app")?)?),
                Box::new(decode_v1(expect_key(obj, "a", "app")?)?),
            ))
        }
        "let" => {
            require_keys(obj, &["t", "x", "a", "v", "b"], "let")?;
            let annot = match expect_key(obj, "a", "let")? {
                Json::Null => None,
                other => Some(Box::new(decode_v1(other)?)),
            };
            Ok(Expr::Let(
                expect_str(obj, "x", "let")?,
                annot,
                Box::new(decode_v1(expect_key(obj, "v", "let")?)?),
                Box::new(decode_v1(expect_key(obj, "b", "let")?)?),
            ))
        }
        "annot" => {
            require_keys(obj, &["t", "e", "a"], "annot")?;
            Ok(Expr::Annot(
                Box::new(decode_v1(expect_key(obj, "e", "annot")?)?),
                Box::new(decode_v1(expect_key(obj, "a", "annot")?)?),
            ))
        }
        "bool" => {
            require_keys(obj, &["t"], "bool")?;
            Ok(Expr::Bool)
        }
        "boollit" => {
            require_keys(obj, &["t", "v"], "boollit")?;
            let v = obj
                .get("v")
                .and_then(Json::as_bool)
                .ok_or(DecodeError::BadNode("boollit"))?;
            Ok(Expr::BoolLit(v))
        }
        "and" => decode_operator(obj, "and", Expr::BoolAnd),
        "or" => decode_operator(obj, "or", Expr::BoolOr),
        "eq" => decode_operator(obj, "eq", Expr::BoolEq),
        "integer" => {
            require_keys(obj, &["t"], "integer")?;
            Ok(Expr::Integer)
        }
        "integerlit" => {
            require_keys(obj, &["t", "v"], "integerlit")?;
            let s = expect_str(obj, "v", "integerlit")?;
            let n: i64 = s.parse().map_err(|_| DecodeError::BadNode("integerlit"))?;
            Ok(Expr::IntegerLit(n))
        }
        "text" => {
            require_keys(obj, &["t"], "text")?;
            Ok(Expr::Text)
        }
        "textlit" => {
            require_keys(obj, &["t", "v"], "textlit")?;
            Ok(Expr::TextLit(expect_str(obj, "v", "textlit")?))
        }
        "list" => {
            require_keys(obj, &["t"], "list")?;
            Ok(Expr::List)
        }
        "listlit" => {
            require_keys(obj, &["t", "a", "v"], "listlit")?;
            let annot = match expect_key(obj, "a", "listlit")? {
                Json::Null => None,
                other => Some(Box::new(decode_v1(other)?)),
            };
            let items = expect_key(obj, "v", "listlit")?
                .as_array()
                .ok_or(DecodeError::BadNode("listlit"))?;
            let mut xs = Vec::with_capacity(items.len());
            for item in items {
                xs.push(decode_v1(item)?);
            }
            Ok(Expr::ListLit(annot, xs))
        }
        "record" => Ok(Expr::RecordType(decode_fields(obj, "record")?)),
        "recordlit" => Ok(Expr::RecordLit(decode_fields(obj, "recordlit")?)),
        "field" => {
            require_keys(obj, &["t", "e", "k"], "field")?;
            Ok(Expr::Field(
                Box::new(decode_v1(expect_key(obj, "e", "field")?)?),
                expect_str(obj, "k", "field")?,
            ))
        }
        other => Err(DecodeError::UnknownTag(other.to_string())),
    }
}

fn decode_operator(
    obj: &serde_json::Map<String, Json>,
    tag: &'static str,
    build: fn(Box<Expr>, Box<Expr>) -> Expr,
) -> Result<Expr, DecodeError> {
    require_keys(obj, &["t", "l", "r"], tag)?;
    Ok(build(
        Box::new(decode_v1(expect_key(obj, "l", tag)?)?),
        Box::new(decode_v1(expect_key(obj, "r", tag)?)?),
    ))
}

fn decode_fields(
    obj: &serde_json::Map<String, Json>,
    tag: &'static str,
) -> Result<Vec<(String, Expr)>, DecodeError> {
    require_keys(obj, &["t", "v"], tag)?;
    let pairs = expect_key(obj, "v", tag)?
        .as_array()
        .ok_or(DecodeError::BadNode(tag))?;
    let mut fields: Vec<(String, Expr)> = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let pair = pair.as_array().ok_or(DecodeError::BadNode(tag))?;
        if pair.len() != 2 {
            return Err(DecodeError::BadNode(tag));
        }
        let key = pair[0].as_str().ok_or(DecodeError::BadNode(tag))?;
        // canonical encodings carry labels in strictly ascending order;
        // anything else (including duplicates) is rejected
        if let Some((previous, _)) = fields.last() {
            if previous.as_str() >= key {
                return Err(DecodeError::BadNode(tag));
            }
        }
        let value = decode_v1(&pair[1])?;
        fields.push((key.to_string(), value));
    }
    Ok(fields)
}

fn require_keys(
    obj: &serde_json::Map<String, Json>,
    keys: &[&str],
    tag: &'static str,
) -> Result<(), DecodeError> {
    if obj.len() != keys.len() || !keys.iter().all(|k| obj.contains_key(*k)) {
        return Err(DecodeError::BadNode(tag));
    }
    Ok(())
}

fn expect_key<'a>(
    obj: &'a serde_json::Map<String, Json>,
    key: &str,
    tag: &'static str,
) -> Result<&'a Json, DecodeError> {
    obj.get(key).ok_or(DecodeError::BadNode(tag))
}

fn expect_str(
    obj: &serde_json::Map<String, Json>,
    key: &str,
    tag: &'static str,
) -> Result<String, DecodeError> {
    obj.get(key)
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or(DecodeError::BadNode(tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{Directory, File, FilePrefix, Import, ImportMode, ImportTarget};

    fn roundtrip(expr: &Expr) {
        let bytes = encode_expression(ProtocolVersion::V1, expr).expect("encodes");
        let back = decode_expression(ProtocolVersion::V1, &bytes).expect("decodes");
        assert_eq!(&back, expr);
    }

    #[test]
    fn field_declaration_order_does_not_change_the_encoding() {
        let forward = Expr::RecordType(vec![
            ("a".to_string(), Expr::Bool),
            ("b".to_string(), Expr::Text),
        ]);
        let backward = Expr::RecordType(vec![
            ("b".to_string(), Expr::Text),
            ("a".to_string(), Expr::Bool),
        ]);
        let x = encode_expression(ProtocolVersion::V1, &forward).unwrap();
        let y = encode_expression(ProtocolVersion::V1, &backward).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn unsorted_record_fields_do_not_decode() {
        let bytes = br#"{"t":"record","v":[["b",{"t":"text"}],["a",{"t":"bool"}]]}"#;
        let err = decode_expression(ProtocolVersion::V1, bytes).unwrap_err();
        assert!(matches!(err, DecodeError::BadNode("record")));
    }

    #[test]
    fn representative_roundtrip() {
        let e = Expr::Lam(
            "x".to_string(),
            Box::new(Expr::Bool),
            Box::new(Expr::BoolEq(
                Box::new(Expr::Var(Var::new("x", 0))),
                Box::new(Expr::BoolLit(false)),
            )),
        );
        roundtrip(&e);
        roundtrip(&Expr::ListLit(
            None,
            vec![Expr::IntegerLit(-3), Expr::IntegerLit(9)],
        ));
        roundtrip(&Expr::TextLit("line\nbreak \"quoted\"".to_string()));
    }

    #[test]
    fn imports_do_not_encode() {
        let import = Import {
            hash: None,
            target: ImportTarget::Local(
                FilePrefix::Here,
                File {
                    directory: Directory::default(),
                    file: "x".to_string(),
                },
            ),
            mode: ImportMode::Code,
        };
        assert!(matches!(
            encode_expression(ProtocolVersion::V1, &Expr::Embed(import)),
            Err(EncodeError::UnresolvedImport)
        ));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode_expression(ProtocolVersion::V1, br#"{"t":"future"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTag(t) if t == "future"));
    }

    #[test]
    fn extra_keys_are_rejected() {
        let err =
            decode_expression(ProtocolVersion::V1, br#"{"t":"bool","junk":1}"#).unwrap_err();
        assert!(matches!(err, DecodeError::BadNode("bool")));
    }
}
