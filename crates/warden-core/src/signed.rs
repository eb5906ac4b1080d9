use crate::error::Result;
use crate::io::atomic_write;
use crate::paths;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

const SECRET_LEN: usize = 32;

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// On-disk shape: the document plus a detached HMAC over its canonical bytes.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    payload: serde_json::Value,
    signature: String,
}

// ---------------------------------------------------------------------------
// SignedStore
// ---------------------------------------------------------------------------

/// JSON persistence with an attached integrity signature.
///
/// `read` verifies the signature before deserializing and treats any failure
/// — missing file, unreadable bytes, malformed JSON, signature mismatch — as
/// "no prior state" (`None`). A tampered state file must never crash the
/// hook pipeline.
pub struct SignedStore {
    secret: Vec<u8>,
}

impl SignedStore {
    /// Open the store for a project root, creating the signing secret on
    /// first use. The secret lives in `.warden/secret` and is never
    /// committed (`warden init` gitignores it).
    pub fn open(root: &Path) -> Result<Self> {
        let secret = load_or_create_secret(root)?;
        Ok(Self { secret })
    }

    /// Construct with an explicit key. Used by tests that need two stores
    /// with different keys.
    pub fn with_secret(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    pub fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let payload = serde_json::to_value(value)?;
        let canonical = serde_json::to_vec(&payload)?;
        let envelope = Envelope {
            payload,
            signature: BASE64.encode(self.sign(&canonical)),
        };
        atomic_write(path, &serde_json::to_vec_pretty(&envelope)?)
    }

    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let bytes = std::fs::read(path).ok()?;
        let envelope: Envelope = serde_json::from_slice(&bytes).ok()?;
        let canonical = serde_json::to_vec(&envelope.payload).ok()?;
        let signature = BASE64.decode(&envelope.signature).ok()?;
        // Constant-time comparison via Mac::verify_slice.
        let mut mac = new_mac(&self.secret);
        mac.update(&canonical);
        mac.verify_slice(&signature).ok()?;
        serde_json::from_value(envelope.payload).ok()
    }

    fn sign(&self, bytes: &[u8]) -> Vec<u8> {
        let mut mac = new_mac(&self.secret);
        mac.update(bytes);
        mac.finalize().into_bytes().to_vec()
    }
}

fn new_mac(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("infallible: HMAC accepts any key length")
}

// ---------------------------------------------------------------------------
// Secret management
// ---------------------------------------------------------------------------

fn load_or_create_secret(root: &Path) -> Result<Vec<u8>> {
    let path = paths::secret_path(root);
    if let Ok(encoded) = std::fs::read_to_string(&path) {
        if let Ok(secret) = BASE64.decode(encoded.trim()) {
            if !secret.is_empty() {
                return Ok(secret);
            }
        }
        // Unreadable secret: fall through and regenerate. Existing state
        // will fail verification and be treated as absent.
    }

    let mut secret = vec![0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    atomic_write(&path, BASE64.encode(&secret).as_bytes())?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = std::fs::set_permissions(&path, perms) {
            tracing::warn!(path = %path.display(), err = %e, "failed to restrict secret permissions");
        }
    }
    Ok(secret)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
