pub mod agent;
pub mod session;
pub mod state;

use thiserror::Error;

use crate::db::StoreError;
use crate::types::{ContentKind, TopicId};

pub use agent::{Advance, CodeOutcome, QuizOutcome, Remediation, SubmissionIssue, TutorAgent};
pub use session::TutoringSession;
pub use state::{TransitionError, Trigger, TutorState};

#[derive(Debug, Error)]
pub enum TutorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("topic {0} is not on this subject's path")]
    UnknownTopic(TopicId),
    #[error("topic {0} is locked")]
    TopicLocked(TopicId),
    #[error("no usable {kind:?} content for topic {topic_id}")]
    MissingCanonicalContent { topic_id: TopicId, kind: ContentKind },
    #[error("option {index} out of range ({available} options)")]
    InvalidOption { index: usize, available: usize },
    #[error("operation needs state {expected:?}, session is in {actual:?}")]
    WrongState {
        expected: TutorState,
        actual: TutorState,
    },
    #[error("challenge already solved")]
    AlreadySolved,
    #[error("cannot leave the topic from state {0:?}")]
    NotReadyToAdvance(TutorState),
    #[error("subject {0} has no topics")]
    EmptyPath(String),
}

/// Starter code shown in the editor; a submission equal to it is not graded.
pub fn coding_template(subject: &str) -> &'static str {
    if subject.eq_ignore_ascii_case("c") {
        "#include <stdio.h>\n\nint main() {\n    // Write your code here\n    return 0;\n}"
    } else if subject.eq_ignore_ascii_case("python") {
        "# Write your python code here\n"
    } else {
        ""
    }
}
