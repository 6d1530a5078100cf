use std::sync::{
    RwLock,
    atomic::{AtomicU64, Ordering},
};

use {
    secrecy::{ExposeSecret, Secret},
    serde_json::Value,
};

/// Server-issued credential authorizing polling and send calls.
///
/// The credential is opaque: it goes back to the remote with the JSON type it
/// arrived with.
#[derive(Clone)]
pub struct Session {
    credential: Secret<String>,
    numeric: bool,
    live: bool,
    generation: u64,
}

impl Session {
    pub fn new(credential: Secret<String>) -> Self {
        Self {
            credential,
            numeric: false,
            live: true,
            generation: 0,
        }
    }

    /// Session from the `session` field of a `connectBot` answer. Only a
    /// non-empty string or a number is a session.
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self::new(Secret::new(s.clone()))),
            Value::Number(n) => Some(Self {
                numeric: true,
                ..Self::new(Secret::new(n.to_string()))
            }),
            _ => None,
        }
    }

    pub fn credential(&self) -> &Secret<String> {
        &self.credential
    }

    /// The credential as it is sent in the `session` request field.
    pub fn wire_value(&self) -> Value {
        let raw = self.credential.expose_secret();
        if self.numeric
            && let Ok(number @ Value::Number(_)) = serde_json::from_str::<Value>(raw)
        {
            return number;
        }
        Value::String(raw.clone())
    }

    /// False once the remote reported this session as expired.
    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Monotonic stamp assigned by the [`SessionStore`] on every replacement.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credential", &"[REDACTED]")
            .field("live", &self.live)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Holder of the single active session of one account.
///
/// Sessions are swapped wholesale, never edited in place.
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    next_generation: AtomicU64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn get(&self) -> Option<Session> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Generation of the stored session, `0` when there is none.
    pub fn generation(&self) -> u64 {
        self.get().map_or(0, |s| s.generation)
    }

    /// Install `session` as the active one, stamping a fresh generation.
    pub fn replace(&self, mut session: Session) -> Session {
        session.generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(session.clone());
        session
    }

    /// Swap in a non-live copy of the session if it is still generation
    /// `generation`. Returns whether anything changed.
    pub fn expire(&self, generation: u64) -> bool {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let expired = match guard.as_ref() {
            Some(s) if s.generation == generation && s.live => Some(Session {
                live: false,
                ..s.clone()
            }),
            _ => None,
        };
        match expired {
            Some(session) => {
                *guard = Some(session);
                true
            },
            None => false,
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
