use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{AppError, ErrorKind, HttpResponse};

/// Parses a response body into a payload.
///
/// JSON content types are parsed as JSON, everything else as UTF-8 text.
/// Unreadable or malformed bodies yield [`Value::Null`].
pub(crate) fn parse_body(response: &HttpResponse) -> Value {
    let Some(bytes) = response.body.as_deref() else {
        return Value::Null;
    };

    let is_json = response
        .header("content-type")
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/json"));

    if is_json {
        serde_json::from_slice(bytes).unwrap_or(Value::Null)
    } else {
        std::str::from_utf8(bytes)
            .map(|text| Value::String(text.to_owned()))
            .unwrap_or(Value::Null)
    }
}

pub(crate) fn decode_payload<T: DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    serde_json::from_value(payload)
        .map_err(|err| AppError::from_kind(ErrorKind::Unknown).with_cause(err))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{decode_payload, parse_body};
    use crate::{ErrorKind, HttpResponse};

    fn response(content_type: Option<&str>, body: Option<&[u8]>) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: content_type
                .map(|ct| vec![("Content-Type".to_owned(), ct.to_owned())])
                .unwrap_or_default(),
            body: body.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn json_content_type_is_parsed() {
        let res = response(
            Some("application/json; charset=utf-8"),
            Some(br#"{"items":[{"id":1,"title":"clip"}],"next":null}"#),
        );
        assert_eq!(
            parse_body(&res),
            json!({"items": [{"id": 1, "title": "clip"}], "next": null})
        );
    }

    #[test]
    fn malformed_json_becomes_null() {
        let res = response(Some("application/json"), Some(b"{not json"));
        assert_eq!(parse_body(&res), Value::Null);

        let empty = response(Some("application/json"), Some(b""));
        assert_eq!(parse_body(&empty), Value::Null);
    }

    #[test]
    fn other_content_types_fall_back_to_text() {
        let res = response(Some("text/html"), Some(b"<h1>Bad Gateway</h1>"));
        assert_eq!(parse_body(&res), json!("<h1>Bad Gateway</h1>"));

        let untyped = response(None, Some(b"ok"));
        assert_eq!(parse_body(&untyped), json!("ok"));
    }

    #[test]
    fn unreadable_or_invalid_text_becomes_null() {
        assert_eq!(parse_body(&response(Some("text/plain"), None)), Value::Null);
        assert_eq!(
            parse_body(&response(Some("text/plain"), Some(&[0xff, 0xfe, 0xfd]))),
            Value::Null
        );
    }

    #[test]
    fn typed_decode_failure_is_unknown() {
        #[derive(Debug, serde::Deserialize)]
        struct Profile {
            #[allow(dead_code)]
            handle: String,
        }

        let err = decode_payload::<Profile>(json!({"handle": 42})).expect_err("must fail");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(err.details.is_some());

        let ok = decode_payload::<Vec<u32>>(json!([1, 2, 3])).expect("must decode");
        assert_eq!(ok, vec![1, 2, 3]);
    }
}
