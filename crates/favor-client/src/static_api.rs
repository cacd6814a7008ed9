//! Canned [`FriendApi`] for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use favor_core::StudentId;

use crate::client::FriendApi;
use crate::error::{ApiError, ApiResult};
use crate::model::{AssistInfo, FriendData, FriendRefresh, RefreshRequest};

/// Build a successful response listing `(id, rank, exp)` triples
pub fn success_response(assists: &[(StudentId, i64, i64)]) -> FriendRefresh {
    FriendRefresh {
        code: 200,
        message: "success".to_string(),
        crypt: false,
        data: Some(FriendData {
            assist_info_list: assists
                .iter()
                .map(|&(unique_id, favor_rank, favor_exp)| AssistInfo {
                    unique_id,
                    favor_rank,
                    favor_exp,
                })
                .collect(),
        }),
    }
}

/// Replays queued results, then repeats the fallback
pub struct StaticFriendApi {
    queue: Mutex<VecDeque<ApiResult<FriendRefresh>>>,
    fallback: Mutex<Option<FriendRefresh>>,
    calls: AtomicUsize,
}

impl StaticFriendApi {
    /// Always answer with `response`
    pub fn new(response: FriendRefresh) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Some(response)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every call with a transport-style failure
    pub fn failing() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queue a result to return before the fallback
    pub fn push(&self, result: ApiResult<FriendRefresh>) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push_back(result);
    }

    pub fn set_fallback(&self, response: Option<FriendRefresh>) {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FriendApi for StaticFriendApi {
    async fn refresh(&self, _request: &RefreshRequest) -> ApiResult<FriendRefresh> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let queued = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(result) = queued {
            return result;
        }
        self.fallback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ApiError::Status(503))
    }
}
