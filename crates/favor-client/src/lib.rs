//! Client for the arona.icu friend refresh API
//!
//! The endpoint takes a friend code and returns the friend's assist
//! students with their favor rank and the exp inside that rank:
//!
//! ```text
//! POST {url}
//! Authorization: {access_token}
//! {"friend": "{usercode}"}
//!
//! {"code": 200, "message": "success", "crypt": false,
//!  "data": {"assistInfoList": [{"uniqueId": 10000, "favorRank": 15, "favorExp": 46}]}}
//! ```

mod client;
mod error;
mod model;
#[cfg(any(test, feature = "test-util"))]
mod static_api;

pub use client::{AronaClient, FriendApi, DEFAULT_TIMEOUT, DEFAULT_URL};
pub use error::{ApiError, ApiResult};
pub use model::{
    AssistInfo, FriendData, FriendRefresh, RefreshBody, RefreshRequest, CODE_QUOTA_EXCEEDED,
};
#[cfg(any(test, feature = "test-util"))]
pub use static_api::{success_response, StaticFriendApi};
