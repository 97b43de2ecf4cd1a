use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::{SUCCESS_CODE, SUCCESS_MSG};

/// Successful response body: the status pair plus the endpoint's payload
/// flattened alongside it.
#[derive(Debug, Serialize, Deserialize)]
pub struct Reply<T> {
    pub status_code: i32,
    pub status_msg: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Reply<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status_code: SUCCESS_CODE,
            status_msg: SUCCESS_MSG.to_string(),
            body,
        }
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
