use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field separator of one wire frame.
///
/// Payloads must never contain this sequence. The codec does not check for
/// it: the server splits on the same literal and the wire format is fixed.
pub const DELIM: &str = "~#~#~";

pub mod actions {
    pub const LOGIN: &str = "login";
    pub const BROWSE: &str = "browse";
    pub const TAGS: &str = "tags";
    pub const LIST: &str = "list";
    pub const REPORT: &str = "report";
    pub const SUMMARY: &str = "summary";
    pub const PHONONS: &str = "phonons";
    pub const PH_DOS: &str = "ph_dos";
    pub const E_DOS: &str = "e_dos";
    pub const PH_BANDS: &str = "ph_bands";
    pub const E_BANDS: &str = "e_bands";
    pub const OPTSTORY: &str = "optstory";
    pub const ESTORY: &str = "estory";
    pub const SETTINGS: &str = "settings";
    pub const CLEAN: &str = "clean";
    pub const DB_CREATE: &str = "db_create";
    pub const DB_COPY: &str = "db_copy";
    pub const DELETE: &str = "delete";
    pub const CHECK_EXPORT: &str = "check_export";
    pub const TRY_PGCONN: &str = "try_pgconn";
    pub const RESTART: &str = "restart";
    pub const TERMINATE: &str = "terminate";

    /// Actions whose requests are never remembered for replay.
    pub const EXEMPT: &[&str] = &[REPORT, RESTART, CLEAN, LOGIN];
}

pub fn is_exempt(action: &str) -> bool {
    actions::EXEMPT.contains(&action)
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("frame has no action")]
    MissingAction,
    #[error("request echo of `{action}` is not valid json: {source}")]
    BadEcho {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One decoded wire message.
///
/// Client frames only carry `action` and `req`; server frames carry all four
/// fields, with `req` echoing the payload of the request being answered.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    pub action: String,
    pub req: Value,
    pub error: String,
    pub data: String,
}

impl Frame {
    pub fn reply(action: &str, req: Value, data: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            req,
            error: String::new(),
            data: data.into(),
        }
    }

    pub fn failure(action: &str, req: Value, error: impl Into<String>) -> Self {
        Self {
            action: action.to_string(),
            req,
            error: error.into(),
            data: String::new(),
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }

    /// Integer field of the echoed request, if present.
    pub fn req_u64(&self, key: &str) -> Option<u64> {
        self.req.get(key).and_then(Value::as_u64)
    }

    pub fn req_str(&self, key: &str) -> Option<&str> {
        self.req.get(key).and_then(Value::as_str)
    }
}

/// Client to server: `action DELIM json(payload)`. An absent payload leaves
/// the second field empty.
pub fn encode(action: &str, payload: Option<&Value>) -> String {
    let body = payload.map(Value::to_string).unwrap_or_default();
    format!("{action}{DELIM}{body}")
}

/// Server to client: all four fields.
pub fn encode_frame(frame: &Frame) -> String {
    let echo = match &frame.req {
        Value::Null => String::new(),
        v => v.to_string(),
    };
    [frame.action.as_str(), echo.as_str(), frame.error.as_str(), frame.data.as_str()].join(DELIM)
}

/// Splits one wire message positionally.
///
/// Missing trailing fields decode as empty strings and an empty echo decodes
/// as `{}`. Anything after the fourth delimiter stays part of `data`.
pub fn decode(wire: &str) -> Result<Frame, ProtocolError> {
    if wire.is_empty() {
        return Err(ProtocolError::Empty);
    }
    let mut fields = wire.splitn(4, DELIM);
    let action = fields.next().unwrap_or_default();
    if action.is_empty() {
        return Err(ProtocolError::MissingAction);
    }
    let echo = fields.next().unwrap_or_default();
    let req = if echo.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(echo).map_err(|source| ProtocolError::BadEcho {
            action: action.to_string(),
            source,
        })?
    };
    let error = fields.next().unwrap_or_default().to_string();
    let data = fields.next().unwrap_or_default().to_string();

    Ok(Frame {
        action: action.to_string(),
        req,
        error,
        data,
    })
}
