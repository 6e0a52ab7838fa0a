//! Cursor-based pagination over a creator's linked list of posts.
//!
//! The remote API exposes no random-access listing; each post document
//! carries `next`/`previous` references to its neighbors. The paginator
//! walks those references one fetch at a time, seeding from the fanclub
//! summary when no cursor exists yet.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{ApiPost, FantiaClient};
use crate::db::CursorState;

/// Chronological walking direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchDirection {
    Newer,
    Older,
}

impl FetchDirection {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newer => "newer",
            Self::Older => "older",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PaginatorState {
    NotStarted,
    /// The next id to fetch and yield.
    AtId(i64),
    Exhausted,
}

/// Lazy pump over a creator's posts. Each `next` call performs at most the
/// fetches needed to yield one record; the in-memory cursor advances with
/// every yield and the caller is responsible for persisting it.
#[derive(Debug)]
pub struct PostPaginator {
    client: FantiaClient,
    creator_id: i64,
    direction: FetchDirection,
    cursor: CursorState,
    remaining: Option<u64>,
    state: PaginatorState,
}

impl PostPaginator {
    #[must_use]
    pub fn new(
        client: FantiaClient,
        creator_id: i64,
        direction: FetchDirection,
        cursor: CursorState,
        limit: Option<u64>,
    ) -> Self {
        Self {
            client,
            creator_id,
            direction,
            cursor,
            remaining: limit,
            state: PaginatorState::NotStarted,
        }
    }

    /// The cursor as of the most recent yield.
    #[must_use]
    pub const fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    /// Fetch the next record in the walking direction, or `None` when the
    /// sequence is exhausted or the limit has been reached.
    ///
    /// # Errors
    ///
    /// Propagates transport and decode errors, including a failed re-fetch
    /// of a cursor record that was deleted upstream; the run aborts and
    /// previously committed progress is retained.
    pub async fn next(&mut self) -> Result<Option<ApiPost>> {
        if matches!(self.state, PaginatorState::NotStarted) {
            self.state = self.start().await?;
        }

        let PaginatorState::AtId(post_id) = self.state else {
            return Ok(None);
        };

        match self.remaining {
            Some(0) => return Ok(None),
            Some(ref mut n) => *n -= 1,
            None => {}
        }

        let post = self.client.fetch_post(post_id).await?;
        debug!(post_id, direction = self.direction.as_str(), "fetched post");

        self.cursor.advance(self.direction, post_id);
        self.state = match self.follow_link(&post) {
            Some(next_id) => PaginatorState::AtId(next_id),
            None => PaginatorState::Exhausted,
        };

        Ok(Some(post))
    }

    /// Determine the first id to yield: seed from the fanclub summary when
    /// no cursor exists for the direction, otherwise re-fetch the cursor
    /// record and step past it.
    async fn start(&mut self) -> Result<PaginatorState> {
        match self.cursor.id_for(self.direction) {
            None => {
                let fanclub = self.client.fetch_fanclub(self.creator_id).await?;
                let Some(most_recent) = fanclub.recent_posts.first() else {
                    debug!(creator_id = self.creator_id, "fanclub has no posts");
                    return Ok(PaginatorState::Exhausted);
                };

                self.cursor.seed(most_recent.id);
                Ok(PaginatorState::AtId(most_recent.id))
            }
            Some(cursor_id) => {
                let post = self.client.fetch_post(cursor_id).await?;
                match self.follow_link(&post) {
                    Some(next_id) => Ok(PaginatorState::AtId(next_id)),
                    None => Ok(PaginatorState::Exhausted),
                }
            }
        }
    }

    /// The neighbor reference matching the walking direction.
    fn follow_link(&self, post: &ApiPost) -> Option<i64> {
        let link = match self.direction {
            FetchDirection::Newer => post.links.next.as_ref(),
            FetchDirection::Older => post.links.previous.as_ref(),
        };
        link.map(|l| l.id)
    }
}
