//! The fetch-tile job kind.

use std::rc::Rc;

use tokio_util::sync::CancellationToken;

use crate::coord::TileCoord;
use crate::job::{JobStep, StepResult};
use crate::provider::{FetchError, FetchPoll, FetchProvider, FetchRequest};

/// Cooperative job that drives one provider fetch to completion.
///
/// The provider request is started lazily on the first step, so a job
/// cancelled while still queued never touches the provider at all. Each
/// step checks the cancellation flag before polling; dropping the job
/// mid-flight drops the request, which providers treat as cancellation.
pub(super) struct FetchJob {
    provider: Rc<dyn FetchProvider>,
    coord: TileCoord,
    cancel: CancellationToken,
    request: Option<Box<dyn FetchRequest>>,
}

impl FetchJob {
    pub(super) fn new(
        provider: Rc<dyn FetchProvider>,
        coord: TileCoord,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            coord,
            cancel,
            request: None,
        }
    }
}

impl JobStep for FetchJob {
    fn step(&mut self) -> StepResult {
        if self.cancel.is_cancelled() {
            self.request = None;
            return StepResult::Fail(FetchError::Cancelled);
        }
        let request = self
            .request
            .get_or_insert_with(|| self.provider.begin(self.coord));
        match request.poll() {
            FetchPoll::Pending => StepResult::Yield,
            FetchPoll::Ready(payload) => {
                self.request = None;
                StepResult::Complete(payload)
            }
            FetchPoll::Failed(error) => {
                self.request = None;
                StepResult::Fail(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::SimProvider;

    fn coord() -> TileCoord {
        TileCoord::new(2, 1, 1, 2).unwrap()
    }

    #[test]
    fn test_fetch_yields_until_provider_resolves() {
        let provider = Rc::new(SimProvider::new(2, 8));
        let mut job = FetchJob::new(provider.clone(), coord(), CancellationToken::new());

        assert!(matches!(job.step(), StepResult::Yield));
        assert!(matches!(job.step(), StepResult::Yield));
        match job.step() {
            StepResult::Complete(payload) => assert_eq!(payload, provider.payload_for(coord())),
            _ => panic!("expected completion on third step"),
        }
    }

    #[test]
    fn test_begin_is_lazy() {
        let provider = Rc::new(SimProvider::instant(8));
        let job = FetchJob::new(provider.clone(), coord(), CancellationToken::new());
        assert_eq!(provider.begun(), 0);
        drop(job);
        assert_eq!(provider.begun(), 0);
        assert_eq!(provider.cancelled(), 0);
    }

    #[test]
    fn test_cancelled_step_abandons_request() {
        let provider = Rc::new(SimProvider::new(5, 8));
        let token = CancellationToken::new();
        let mut job = FetchJob::new(provider.clone(), coord(), token.clone());

        assert!(matches!(job.step(), StepResult::Yield));
        token.cancel();
        assert!(matches!(
            job.step(),
            StepResult::Fail(FetchError::Cancelled)
        ));
        assert_eq!(provider.cancelled(), 1, "in-flight request must be dropped");
    }

    #[test]
    fn test_provider_failure_propagates() {
        let provider = Rc::new(SimProvider::instant(8));
        provider.fail_tile(coord());
        let mut job = FetchJob::new(provider, coord(), CancellationToken::new());
        assert!(matches!(job.step(), StepResult::Fail(FetchError::NotFound)));
    }

    #[test]
    fn test_drop_mid_flight_cancels() {
        let provider = Rc::new(SimProvider::new(5, 8));
        let mut job = FetchJob::new(provider.clone(), coord(), CancellationToken::new());
        let _ = job.step();
        drop(job);
        assert_eq!(provider.cancelled(), 1);
    }
}
