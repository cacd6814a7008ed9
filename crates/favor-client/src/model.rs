//! Request and response bodies of the friend refresh endpoint

use favor_core::StudentId;
use favor_rank::RankTable;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};

/// Response code the service uses when the token ran out of requests
pub const CODE_QUOTA_EXCEEDED: i64 = 4003;

/// Everything needed to call the endpoint for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub url: String,
    pub access_token: String,
    /// In-game friend code of the account
    pub usercode: String,
}

/// JSON body sent to the endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RefreshBody<'a> {
    pub friend: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FriendRefresh {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub crypt: bool,
    #[serde(default)]
    pub data: Option<FriendData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendData {
    #[serde(default)]
    pub assist_info_list: Vec<AssistInfo>,
}

/// One assist student of the friend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistInfo {
    pub unique_id: StudentId,
    pub favor_rank: i64,
    /// Exp within the current rank
    pub favor_exp: i64,
}

impl FriendRefresh {
    /// Check the response carries plain data the caller can read
    pub fn ensure_usable(&self) -> ApiResult<()> {
        if self.code == CODE_QUOTA_EXCEEDED {
            return Err(ApiError::QuotaExceeded);
        }
        if self.message != "success" {
            return Err(ApiError::Rejected {
                code: self.code,
                message: self.message.clone(),
            });
        }
        if self.crypt {
            return Err(ApiError::Encrypted);
        }
        Ok(())
    }

    pub fn assists(&self) -> ApiResult<&[AssistInfo]> {
        self.data
            .as_ref()
            .map(|d| d.assist_info_list.as_slice())
            .ok_or(ApiError::MissingData)
    }

    pub fn assist(&self, student_id: StudentId) -> ApiResult<&AssistInfo> {
        self.assists()?
            .iter()
            .find(|a| a.unique_id == student_id)
            .ok_or(ApiError::StudentNotFound(student_id))
    }

    /// Student ids in response order
    pub fn assist_ids(&self) -> Vec<StudentId> {
        self.assists()
            .map(|list| list.iter().map(|a| a.unique_id).collect())
            .unwrap_or_default()
    }
}

impl AssistInfo {
    /// Cumulative exp: threshold of the rank plus exp within it
    pub fn cumulative_exp(&self, table: &RankTable) -> ApiResult<u64> {
        let rank = u32::try_from(self.favor_rank).map_err(|_| ApiError::InvalidValue {
            field: "favorRank",
            value: self.favor_rank,
        })?;
        let exp = u64::try_from(self.favor_exp).map_err(|_| ApiError::InvalidValue {
            field: "favorExp",
            value: self.favor_exp,
        })?;
        Ok(table.total_for(rank, exp))
    }
}
