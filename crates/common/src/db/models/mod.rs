//! SeaORM entity models
//!
//! Database entities for IdeaForge

mod prompt_fragment;
mod submission;

pub use submission::{
    Entity as SubmissionEntity,
    Model as Submission,
    ActiveModel as SubmissionActiveModel,
    Column as SubmissionColumn,
};

pub use prompt_fragment::{
    Entity as PromptFragmentEntity,
    Model as PromptFragment,
    ActiveModel as PromptFragmentActiveModel,
    Column as PromptFragmentColumn,
};
