//! Fan-out of a user's display name into the snapshots other rows keep of it.
//!
//! Recipes carry `chef_name` and comments carry `author_name`. Both are
//! copies taken at write time, so a rename has to be pushed out after the
//! user row itself has been updated. The two steps run independently: a
//! failure in one is logged and does not stop or undo the other.

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::state::AppState;

/// Rows touched by a name propagation; `None` marks a step that failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub recipes: Option<u64>,
    pub comments: Option<u64>,
}

#[instrument(skip(st, new_name))]
pub async fn propagate_name_change(st: &AppState, user_id: Uuid, new_name: &str) -> SyncOutcome {
    let recipes = match st.recipes.rename_chef(user_id, new_name).await {
        Ok(n) => Some(n),
        Err(e) => {
            error!(error = %format!("{e:#}"), "chef name sync failed");
            None
        }
    };
    let comments = match st.recipes.rename_comment_author(user_id, new_name).await {
        Ok(n) => Some(n),
        Err(e) => {
            error!(error = %format!("{e:#}"), "comment author sync failed");
            None
        }
    };
    info!(?recipes, ?comments, "name propagated");
    SyncOutcome { recipes, comments }
}
