//! Wire-shaped lambda call request/response.
//!
//! Field set per `spec.md` §6 and `original_source/Edge/edgeclientgrpc.cpp`.
//! The admin/wire boundary is structural, not bit-exact, so both types
//! derive `serde` for a ready JSON encoding rather than a bespoke codec.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A forwarded lambda invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaRequest {
    pub lambda_name: String,
    pub input: Vec<u8>,
    pub data_in: Vec<u8>,
    #[serde(default)]
    pub states: Option<HashMap<String, Vec<u8>>>,
    #[serde(default)]
    pub chain: Option<Vec<String>>,
    #[serde(default)]
    pub callback_endpoint: Option<String>,
    #[serde(default)]
    pub next_function_index: Option<usize>,
    /// `true` means "run the router but do not actually execute the
    /// lambda". The `Transport` implementation is responsible for
    /// honoring it.
    #[serde(default)]
    pub dry: bool,
}

impl LambdaRequest {
    pub fn new(lambda_name: impl Into<String>, input: Vec<u8>, data_in: Vec<u8>) -> Self {
        Self {
            lambda_name: lambda_name.into(),
            input,
            data_in,
            states: None,
            chain: None,
            callback_endpoint: None,
            next_function_index: None,
            dry: false,
        }
    }

    pub fn dry(mut self) -> Self {
        self.dry = true;
        self
    }
}

/// The literal success marker carried in [`LambdaResponse::ret_code`].
pub const RET_CODE_OK: &str = "OK";

/// The response to a forwarded lambda invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LambdaResponse {
    /// `"OK"` on success, or a diagnostic string (typically a stringified
    /// [`crate::DispatchError`]) on failure.
    pub ret_code: String,
    pub output: Vec<u8>,
    pub data_out: Vec<u8>,
    pub processing_time_seconds: f64,
    pub load_1: f64,
    pub load_10: f64,
    pub load_30: f64,
    pub responder_endpoint: String,
    /// Carried on the wire for hop-limited forwarding chains; the core
    /// always treats the selected destination as terminal (see
    /// `DESIGN.md`'s Open Question (b)), so this is always `0` in practice.
    pub hops: u32,
    pub asynchronous: bool,
    #[serde(default)]
    pub states: Option<HashMap<String, Vec<u8>>>,
}

impl LambdaResponse {
    pub fn ok(responder_endpoint: impl Into<String>, processing_time_seconds: f64) -> Self {
        Self {
            ret_code: RET_CODE_OK.to_string(),
            output: Vec::new(),
            data_out: Vec::new(),
            processing_time_seconds,
            load_1: 0.0,
            load_10: 0.0,
            load_30: 0.0,
            responder_endpoint: responder_endpoint.into(),
            hops: 0,
            asynchronous: false,
            states: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ret_code == RET_CODE_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_flag_builder() {
        let req = LambdaRequest::new("f", vec![1], vec![2]).dry();
        assert!(req.dry);
        assert_eq!(req.lambda_name, "f");
    }

    #[test]
    fn ok_response_round_trips_through_json() {
        let resp = LambdaResponse::ok("host:1", 0.01);
        let json = serde_json::to_string(&resp).unwrap();
        let back: LambdaResponse = serde_json::from_str(&json).unwrap();
        assert!(back.is_ok());
        assert_eq!(back.responder_endpoint, "host:1");
    }
}
