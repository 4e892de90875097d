//! Feed watcher.
//!
//! Waits for the document body and the feed root, then observes the root's
//! subtree and hands every post element it sees to the injector. Posts that
//! were rendered before observation started are picked up by an initial scan.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::dom::{Document, MutationRecord, NodeId, Page, Selector};
use crate::injector::{attach_action, AttachOutcome, ShareTrigger};
use crate::wait::{retry_until, Cancellation, RetryPolicy};
use crate::{Result, ShareConfig};

/// Post elements introduced by a batch: every added element that matches
/// the post selector plus matching descendants of added subtrees, in
/// document order and without duplicates.
pub fn posts_in_batch(doc: &Document, batch: &[MutationRecord], post: &Selector) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    for record in batch {
        for &added in &record.added {
            if !doc.is_element(added) {
                continue;
            }
            if doc.matches(added, post) && seen.insert(added) {
                found.push(added);
            }
            for nested in doc.query_selector_all(added, post) {
                if seen.insert(nested) {
                    found.push(nested);
                }
            }
        }
    }
    found
}

pub struct Watcher {
    page: Page,
    config: Arc<ShareConfig>,
    trigger: ShareTrigger,
    cancel: Cancellation,
}

impl Watcher {
    pub fn new(
        page: Page,
        config: Arc<ShareConfig>,
        trigger: ShareTrigger,
        cancel: Cancellation,
    ) -> Self {
        Self {
            page,
            config,
            trigger,
            cancel,
        }
    }

    /// Run until cancelled or the page drops the observer.
    ///
    /// Returns [`crate::Error::NotReady`] when the feed root never appears
    /// within `root_max_attempts`, and [`crate::Error::Cancelled`] when the
    /// session is shut down while waiting.
    pub async fn run(self) -> Result<()> {
        let page = &self.page;
        let config = &self.config;

        retry_until(RetryPolicy::forever(config.body_poll()), &self.cancel, || {
            page.body()
        })
        .await?;

        let root_sel = Selector::parse(&config.selectors.feed_root)?;
        let post_sel = Selector::parse(&config.selectors.post)?;
        let root_policy = RetryPolicy {
            interval: config.root_poll(),
            max_attempts: config.root_max_attempts,
        };
        let root = retry_until(root_policy, &self.cancel, || {
            page.read(|d| d.query_selector(d.root(), &root_sel))
        })
        .await?;
        info!("feed root {} found, observing posts", root);

        // Subscribe before the scan so nothing inserted in between is missed;
        // the injector's marker check absorbs any overlap.
        let (observer, mut batches) = page.observe(root, true)?;
        let existing = page.read(|d| d.query_selector_all(d.root(), &post_sel));
        debug!("{} post(s) already on the page", existing.len());
        for post in existing {
            self.process(post);
        }

        loop {
            tokio::select! {
                batch = batches.recv() => {
                    let Some(batch) = batch else {
                        debug!("observer channel closed");
                        break;
                    };
                    let posts = page.read(|d| posts_in_batch(d, &batch, &post_sel));
                    for post in posts {
                        self.process(post);
                    }
                }
                _ = self.cancel.cancelled() => {
                    debug!("watcher cancelled");
                    break;
                }
            }
        }
        page.disconnect(observer);
        Ok(())
    }

    fn process(&self, post: NodeId) {
        match attach_action(&self.page, post, &self.config, self.trigger.clone()) {
            Ok(AttachOutcome::Attached(button)) => debug!("share action {} attached to post {}", button, post),
            Ok(AttachOutcome::NoActionBar) => debug!("post {} has no action bar", post),
            Ok(AttachOutcome::AlreadyPresent) | Ok(AttachOutcome::Detached) => {}
            Err(e) => warn!("failed to attach share action to post {}: {}", post, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_yields_nested_posts_once() {
        let page = Page::from_html("<body><main></main></body>", None).unwrap();
        let main = page.query_selector(page.root(), "main").unwrap().unwrap();
        let (_id, mut rx) = page.observe(main, true).unwrap();

        let (a, b) = page.update(|d| {
            let wrapper = d.create_element("div");
            let a = d.create_element("article");
            let b = d.create_element("article");
            let text = d.create_text("noise");
            d.append_child(wrapper, a).unwrap();
            d.append_child(wrapper, b).unwrap();
            d.append_child(main, wrapper).unwrap();
            d.append_child(main, text).unwrap();
            // moving an already reported post must not duplicate it
            d.append_child(main, a).unwrap();
            (a, b)
        });

        let batch = rx.try_recv().unwrap();
        let sel = Selector::parse("article").unwrap();
        let posts = page.read(|d| posts_in_batch(d, &batch, &sel));
        assert_eq!(posts.len(), 2);
        assert!(posts.contains(&a) && posts.contains(&b));
    }
}
