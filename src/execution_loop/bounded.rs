//! Bounded Feedback Loop
//!
//! propose -> validate -> augment-on-failure, for at most `budget` attempts.
//! Both the synthesis loop and the execution-repair loop run on this driver
//! with their own budgets and feedback shapes.

use crate::error::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Result of asking for the next candidate.
#[derive(Debug)]
pub enum Proposal<C, F> {
    Ready(C),
    /// No usable candidate this attempt; the attempt is still consumed.
    Unusable(F),
}

#[derive(Debug)]
pub enum Verdict<A, F> {
    Accept(A),
    Reject(F),
}

/// One instantiation of the loop. Any `Err` returned from these methods ends
/// the loop immediately and is handed to the caller unchanged.
#[async_trait]
pub trait FeedbackLoop: Send {
    type Candidate: Send + Sync;
    type Accepted: Send;
    type Feedback: Send + Sync;

    async fn propose(&mut self, attempt: u32) -> Result<Proposal<Self::Candidate, Self::Feedback>>;

    async fn validate(
        &mut self,
        candidate: &Self::Candidate,
    ) -> Result<Verdict<Self::Accepted, Self::Feedback>>;

    /// Fold a failure into the state used by the next attempt. Only called when
    /// another attempt will follow.
    async fn augment(
        &mut self,
        candidate: Option<&Self::Candidate>,
        feedback: &Self::Feedback,
    ) -> Result<()>;
}

#[derive(Debug)]
pub enum LoopOutcome<C, A, F> {
    Accepted {
        value: A,
        candidate: C,
        attempts: u32,
    },
    /// `last_candidate` and `last_feedback` always come from the final
    /// attempt; an unusable final proposal leaves no candidate.
    Exhausted {
        last_candidate: Option<C>,
        last_feedback: Option<F>,
        attempts: u32,
    },
}

pub async fn run_bounded<L: FeedbackLoop>(
    policy: &mut L,
    budget: u32,
) -> Result<LoopOutcome<L::Candidate, L::Accepted, L::Feedback>> {
    let mut last_candidate: Option<L::Candidate> = None;
    let mut last_feedback: Option<L::Feedback> = None;

    for attempt in 1..=budget {
        info!("Attempt {} of {}", attempt, budget);
        let has_next = attempt < budget;

        let candidate = match policy.propose(attempt).await? {
            Proposal::Ready(candidate) => candidate,
            Proposal::Unusable(feedback) => {
                warn!("Attempt {} produced no usable candidate", attempt);
                if has_next {
                    policy.augment(None, &feedback).await?;
                }
                last_candidate = None;
                last_feedback = Some(feedback);
                continue;
            }
        };

        match policy.validate(&candidate).await? {
            Verdict::Accept(value) => {
                info!("Attempt {} accepted", attempt);
                return Ok(LoopOutcome::Accepted {
                    value,
                    candidate,
                    attempts: attempt,
                });
            }
            Verdict::Reject(feedback) => {
                warn!("Attempt {} rejected", attempt);
                if has_next {
                    policy.augment(Some(&candidate), &feedback).await?;
                }
                last_candidate = Some(candidate);
                last_feedback = Some(feedback);
            }
        }
    }

    Ok(LoopOutcome::Exhausted {
        last_candidate,
        last_feedback,
        attempts: budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NlqError;

    /// Accepts the first candidate >= `target`; proposals count up from 1 and
    /// `skip` attempts yield nothing.
    struct Counter {
        target: u32,
        skip: Vec<u32>,
        augments: Vec<(Option<u32>, String)>,
        fail_augment: bool,
    }

    impl Counter {
        fn new(target: u32) -> Self {
            Self {
                target,
                skip: Vec::new(),
                augments: Vec::new(),
                fail_augment: false,
            }
        }
    }

    #[async_trait]
    impl FeedbackLoop for Counter {
        type Candidate = u32;
        type Accepted = String;
        type Feedback = String;

        async fn propose(&mut self, attempt: u32) -> Result<Proposal<u32, String>> {
            if self.skip.contains(&attempt) {
                return Ok(Proposal::Unusable(format!("skip {}", attempt)));
            }
            Ok(Proposal::Ready(attempt))
        }

        async fn validate(&mut self, candidate: &u32) -> Result<Verdict<String, String>> {
            if *candidate >= self.target {
                Ok(Verdict::Accept(format!("ok {}", candidate)))
            } else {
                Ok(Verdict::Reject(format!("too small {}", candidate)))
            }
        }

        async fn augment(&mut self, candidate: Option<&u32>, feedback: &String) -> Result<()> {
            if self.fail_augment {
                return Err(NlqError::Llm("down".to_string()));
            }
            self.augments.push((candidate.copied(), feedback.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_accepts_within_budget() {
        let mut policy = Counter::new(2);
        match run_bounded(&mut policy, 3).await.unwrap() {
            LoopOutcome::Accepted {
                value, attempts, ..
            } => {
                assert_eq!(value, "ok 2");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(policy.augments, vec![(Some(1), "too small 1".to_string())]);
    }

    #[tokio::test]
    async fn test_exhausts_strictly_and_skips_final_augment() {
        let mut policy = Counter::new(10);
        match run_bounded(&mut policy, 3).await.unwrap() {
            LoopOutcome::Exhausted {
                last_candidate,
                last_feedback,
                attempts,
            } => {
                assert_eq!(last_candidate, Some(3));
                assert_eq!(last_feedback.as_deref(), Some("too small 3"));
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(policy.augments.len(), 2);
    }

    #[tokio::test]
    async fn test_unusable_consumes_attempt() {
        let mut policy = Counter::new(2);
        policy.skip = vec![1, 2];
        match run_bounded(&mut policy, 3).await.unwrap() {
            LoopOutcome::Accepted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(policy.augments[0], (None, "skip 1".to_string()));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_final_attempt_only() {
        let mut policy = Counter::new(10);
        policy.skip = vec![3];
        match run_bounded(&mut policy, 3).await.unwrap() {
            LoopOutcome::Exhausted {
                last_candidate,
                last_feedback,
                ..
            } => {
                assert_eq!(last_candidate, None);
                assert_eq!(last_feedback.as_deref(), Some("skip 3"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_augment_error_ends_loop() {
        let mut policy = Counter::new(10);
        policy.fail_augment = true;
        assert!(matches!(
            run_bounded(&mut policy, 3).await,
            Err(NlqError::Llm(_))
        ));
    }
}
