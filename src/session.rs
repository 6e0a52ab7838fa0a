//! Orchestration of pagination, normalization, and cursor persistence.
//!
//! A session drives the paginator one record at a time, feeds each record
//! through the normalizer, and persists the cursor after every record so a
//! crash never repeats completed asset transfers. Posts are yielded to the
//! caller incrementally, in strict pagination order.

use std::collections::VecDeque;

use anyhow::Result;
use tracing::{debug, info};

use crate::api::FantiaClient;
use crate::db::{
    append_feed_entry, update_subscription_cursor, CursorState, Database, Post, Subscription,
};
use crate::normalizer::Normalizer;
use crate::paginator::{FetchDirection, PostPaginator};

/// A synchronization session for one creator: either a durable subscription
/// or a one-off search.
#[derive(Debug)]
pub struct SyncSession {
    db: Database,
    client: FantiaClient,
    normalizer: Normalizer,
    creator_id: i64,
    subscription: Option<Subscription>,
    cursor: CursorState,
}

impl SyncSession {
    /// Session backed by a durable subscription; full assets are fetched
    /// and results are appended to the subscription feed.
    #[must_use]
    pub fn for_subscription(
        db: Database,
        client: FantiaClient,
        normalizer: Normalizer,
        subscription: Subscription,
    ) -> Self {
        let cursor = subscription.cursor();
        Self {
            db,
            client,
            normalizer,
            creator_id: subscription.creator_id,
            subscription: Some(subscription),
            cursor,
        }
    }

    /// One-off session for a creator; runs in preview mode (thumbnails
    /// only) and keeps its cursor in memory.
    #[must_use]
    pub fn for_search(
        db: Database,
        client: FantiaClient,
        normalizer: Normalizer,
        creator_id: i64,
    ) -> Self {
        Self {
            db,
            client,
            normalizer,
            creator_id,
            subscription: None,
            cursor: CursorState::default(),
        }
    }

    /// The cursor as of the latest completed unit of work.
    #[must_use]
    pub const fn cursor(&self) -> CursorState {
        self.cursor
    }

    /// Start a fetch run. The direction is forced to `Older` when no tail
    /// cursor exists yet; bootstrap always walks backward from the seed.
    pub fn fetch(&mut self, direction: FetchDirection, limit: Option<u64>) -> FetchRun<'_> {
        let direction = if self.cursor.tail_id.is_none() {
            FetchDirection::Older
        } else {
            direction
        };
        info!(
            creator_id = self.creator_id,
            direction = direction.as_str(),
            limit,
            "starting fetch"
        );

        let paginator = PostPaginator::new(
            self.client.clone(),
            self.creator_id,
            direction,
            self.cursor,
            limit,
        );
        let preview = self.subscription.is_none();

        FetchRun {
            session: self,
            paginator,
            preview,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

/// One in-progress fetch: a pump yielding normalized posts in encounter
/// order.
#[derive(Debug)]
pub struct FetchRun<'a> {
    session: &'a mut SyncSession,
    paginator: PostPaginator,
    preview: bool,
    pending: VecDeque<Post>,
    finished: bool,
}

impl FetchRun<'_> {
    /// The next normalized post, or `None` once pagination is exhausted or
    /// the limit is reached. Cursor state is persisted after each record
    /// and once more at the end of the run.
    ///
    /// # Errors
    ///
    /// Propagates transport, normalization, and persistence failures; work
    /// committed for earlier records is retained.
    pub async fn next(&mut self) -> Result<Option<Post>> {
        loop {
            if let Some(post) = self.pending.pop_front() {
                return Ok(Some(post));
            }
            if self.finished {
                return Ok(None);
            }

            let Some(record) = self.paginator.next().await? else {
                self.finished = true;
                self.persist_cursor().await?;
                return Ok(None);
            };

            let posts = self
                .session
                .normalizer
                .normalize(&record, None, self.preview)
                .await?;

            if let Some(subscription) = &self.session.subscription {
                for post in &posts {
                    append_feed_entry(self.session.db.pool(), subscription.id, post.id).await?;
                }
            }

            // The record is fully processed, downloads included; advancing
            // the durable cursor now is what makes the run resumable.
            self.persist_cursor().await?;
            debug!(record_id = record.id, posts = posts.len(), "record processed");

            self.pending.extend(posts);
        }
    }

    /// Drain the run into a vector.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::next`].
    pub async fn collect(mut self) -> Result<Vec<Post>> {
        let mut posts = Vec::new();
        while let Some(post) = self.next().await? {
            posts.push(post);
        }
        Ok(posts)
    }

    async fn persist_cursor(&mut self) -> Result<()> {
        self.session.cursor = *self.paginator.cursor();

        if let Some(subscription) = &mut self.session.subscription {
            subscription.head_id = self.session.cursor.head_id;
            subscription.tail_id = self.session.cursor.tail_id;
            update_subscription_cursor(
                self.session.db.pool(),
                subscription.id,
                &self.session.cursor,
            )
            .await?;
        }

        Ok(())
    }
}
