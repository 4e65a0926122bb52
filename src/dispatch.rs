//! The dispatch loop: read, decode, route

use crate::{
    decoder::FrameDecoder,
    error::{ConnectionError, ErrorReporter, SdkError},
    subscription::SubscriptionRegistry,
    transport::Transport,
};
use tokio::sync::mpsc;

/// Why the dispatch loop returned
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchExit {
    /// Shutdown was requested
    Shutdown,
    /// The transport failed; the supervisor decides whether to reconnect.
    /// `frames_read` counts frames received on the failed connection.
    Failed {
        error: ConnectionError,
        frames_read: u64,
    },
}

/// Run until the transport fails or shutdown is signalled.
///
/// Routing never waits on a consumer: full queues drop the update.
pub async fn run_dispatch_loop(
    transport: &Transport,
    decoder: &FrameDecoder,
    registry: &SubscriptionRegistry,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> DispatchExit {
    let mut frames_read = 0u64;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!("Shutdown signal received");
                return DispatchExit::Shutdown;
            }
            result = transport.read() => {
                match result {
                    Ok(frame) => {
                        frames_read += 1;
                        route_frame(decoder, registry, &frame);
                    }
                    Err(e) => {
                        tracing::warn!("Push connection read failed: {}", e);
                        return DispatchExit::Failed { error: e, frames_read };
                    }
                }
            }
        }
    }
}

/// Decode one frame and hand its updates to the channel's queue in order.
///
/// Returns how many updates were enqueued.
pub fn route_frame(decoder: &FrameDecoder, registry: &SubscriptionRegistry, raw: &str) -> usize {
    let frame = match decoder.decode(raw) {
        Ok(Some(frame)) => frame,
        Ok(None) => return 0,
        Err(e) => {
            ErrorReporter::report_error(&SdkError::Decode(e), "decode_frame");
            return 0;
        }
    };

    let mut delivered = 0;
    for update in frame.updates {
        if registry.deliver(&frame.channel, update) {
            delivered += 1;
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PushUpdate;
    use crate::directory::ChannelDirectory;
    use std::sync::Arc;

    fn fixture() -> (FrameDecoder, SubscriptionRegistry) {
        let directory = Arc::new(ChannelDirectory::from_markets([("BTC_ETH", 148)]));
        (FrameDecoder::new(directory), SubscriptionRegistry::new(8))
    }

    #[test]
    fn test_batch_routed_in_order() {
        let (decoder, registry) = fixture();
        let (queue, _) = registry.activate("BTC_ETH", 148);

        let raw = r#"[148,10,[["o",1,"1.0","2.0"],["o",0,"3.0","0.00000000"],["t","5",0,"1.0","1.0",1.0]]]"#;
        assert_eq!(route_frame(&decoder, &registry, raw), 3);

        assert!(matches!(queue.try_recv(), Some(PushUpdate::OrderBookModify(_))));
        assert!(matches!(queue.try_recv(), Some(PushUpdate::OrderBookRemove(_))));
        assert!(matches!(queue.try_recv(), Some(PushUpdate::NewTrade(_))));
        assert!(queue.try_recv().is_none());
    }

    #[test]
    fn test_bad_frame_dropped_silently() {
        let (decoder, registry) = fixture();
        let (queue, _) = registry.activate("BTC_ETH", 148);

        let raw = r#"[148,11,[["o",1,"1.0","2.0"],["o",1,"oops","2.0"]]]"#;
        assert_eq!(route_frame(&decoder, &registry, raw), 0);
        assert!(queue.is_empty());
        assert_eq!(route_frame(&decoder, &registry, "[1010]"), 0);
    }

    #[test]
    fn test_unsubscribed_channel_not_routed() {
        let (decoder, registry) = fixture();
        let raw = r#"[148,12,[["o",1,"1.0","2.0"]]]"#;
        assert_eq!(route_frame(&decoder, &registry, raw), 0);
        assert!(registry.get("BTC_ETH").is_none());
    }
}
