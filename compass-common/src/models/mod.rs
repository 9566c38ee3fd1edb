//! Domain models shared by the database and service layers

mod career;
mod form;
mod ladder;
mod note;
mod org;
mod snapshot;
mod timeline;
mod user;

pub use career::{DataAccessOverride, Notice, OverrideScope, StockGrant, TitleChange};
pub use form::{AssessmentForm, FormAssignment, FormQuestion, FormSubmission};
pub use ladder::{round_to_band, Ladder, LadderAspect, LadderLevel, PayBand, Stage};
pub use note::{
    AccessVector, AspectChange, Cycle, Feedback, FeedbackRequest, Note, NoteType, NoteUserAccess,
    OneOnOne, ProposalType, SubmitStatus, Summary, SummaryStatus, ValueTag,
};
pub use org::{
    Chapter, Committee, Department, Organization, OrgCategory, Role, RoleScope, RoleType, Team,
    Tribe,
};
pub use snapshot::{
    CompensationSnapshot, OrgAssignmentSnapshot, SeniorityLevel, SenioritySnapshot,
};
pub use timeline::{visibility, EventSource, EventType, TimelineEvent};
pub use user::{ApiKey, User};
