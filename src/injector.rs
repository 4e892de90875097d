//! Share control injection.

use std::sync::Arc;

use crate::dom::{NodeId, Page, Propagation, Selector};
use crate::{Result, ShareConfig};

/// Callback started by a share control; receives the post it belongs to
pub type ShareTrigger = Arc<dyn Fn(NodeId) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A new control was appended to the post's action bar
    Attached(NodeId),
    AlreadyPresent,
    /// The post layout has no action bar; nothing attached
    NoActionBar,
    /// The post left the document before it could be processed
    Detached,
}

/// Attach the share control to `post` unless it already carries one.
///
/// The check and the insertion happen under one document lock, so repeated
/// or concurrent calls leave exactly one control on the post.
pub fn attach_action(
    page: &Page,
    post: NodeId,
    config: &ShareConfig,
    trigger: ShareTrigger,
) -> Result<AttachOutcome> {
    let marker = Selector::parse(&config.action_selector())?;
    let action_bar = Selector::parse(&config.selectors.action_bar)?;

    page.update(|d| {
        if !d.is_connected(post) {
            return Ok(AttachOutcome::Detached);
        }
        if d.query_selector(post, &marker).is_some() {
            return Ok(AttachOutcome::AlreadyPresent);
        }
        let Some(bar) = d.query_selector(post, &action_bar) else {
            return Ok(AttachOutcome::NoActionBar);
        };

        let button = d.create_element("button");
        d.set_attr(button, "type", "button")?;
        d.set_attr(button, "class", &config.action_class)?;
        d.set_text(button, &config.labels.share)?;
        d.append_child(bar, button)?;
        d.set_click_handler(
            button,
            Arc::new(move |_, _| {
                trigger(post);
                // the host's own post click handling must not fire
                Propagation::Stop
            }),
        );
        Ok(AttachOutcome::Attached(button))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const POST: &str = r#"<body><main><article id="p"><div role="group"></div></article>
        <article id="bare"></article></main></body>"#;

    #[test]
    fn attaches_once_and_triggers_with_post() {
        let page = Page::from_html(POST, None).unwrap();
        let cfg = ShareConfig::default();
        let post = page.query_selector(page.root(), "#p").unwrap().unwrap();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let h = hits.clone();
        let trigger: ShareTrigger = Arc::new(move |p| h.lock().unwrap().push(p));

        let first = attach_action(&page, post, &cfg, trigger.clone()).unwrap();
        let AttachOutcome::Attached(button) = first else {
            panic!("expected attach, got {:?}", first);
        };
        for _ in 0..5 {
            assert_eq!(
                attach_action(&page, post, &cfg, trigger.clone()).unwrap(),
                AttachOutcome::AlreadyPresent
            );
        }
        assert_eq!(page.query_selector_all(post, ".x-share-button").unwrap().len(), 1);
        assert_eq!(page.inner_text(button), "Share");

        page.click(button).unwrap();
        assert_eq!(*hits.lock().unwrap(), vec![post]);
    }

    #[test]
    fn missing_action_bar_and_detached_posts_are_skipped() {
        let page = Page::from_html(POST, None).unwrap();
        let cfg = ShareConfig::default();
        let trigger: ShareTrigger = Arc::new(|_| {});
        let bare = page.query_selector(page.root(), "#bare").unwrap().unwrap();
        assert_eq!(
            attach_action(&page, bare, &cfg, trigger.clone()).unwrap(),
            AttachOutcome::NoActionBar
        );

        let post = page.query_selector(page.root(), "#p").unwrap().unwrap();
        page.update(|d| d.remove(post));
        assert_eq!(
            attach_action(&page, post, &cfg, trigger).unwrap(),
            AttachOutcome::Detached
        );
    }
}
