//! Messages pushed to realtime clients.

use crate::game::Session;
use serde::{Deserialize, Serialize};

/// Server push. Serializes as `{"type":"session","session":{..}}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushMessage {
    Session { session: Session },
}

impl PushMessage {
    /// Encode a session snapshot push
    pub fn encode_session(session: &Session) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        #[serde(tag = "type", rename_all = "lowercase")]
        enum Borrowed<'a> {
            Session { session: &'a Session },
        }
        serde_json::to_string(&Borrowed::Session { session })
    }
}
