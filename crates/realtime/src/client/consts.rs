pub const MODEL_API_KEY: &str = "MODEL_API_KEY";

pub const BASE_URL: &str = "ws://127.0.0.1:8081/v1";
pub const DEFAULT_MODEL: &str = "amazon.nova-sonic-v1:0";
pub const DEFAULT_CAPACITY: usize = 1024;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const MODEL_ID_HEADER: &str = "X-Model-Id";
