//! Registration wizard.
//!
//! A [`Wizard`] is an in-memory state machine over a fixed sequence of steps.
//! It validates each step locally and keeps what was entered when the user
//! goes back. Anything that needs the network (signing up, the final write)
//! is handed back to the caller as an [`Advance`] value.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::UserType;
use crate::session::Identity;
use crate::storage::MAX_IMAGE_BYTES;

pub mod handlers;
pub mod report;
pub mod steps;
pub mod store;
pub mod submit;

/// Achievements a single wizard may hold.
pub const MAX_ACHIEVEMENTS: usize = 10;
/// Image bytes a single wizard may hold across all achievements.
pub const MAX_WIZARD_IMAGE_BYTES: usize = 3 * MAX_IMAGE_BYTES;

use report::ReportSheet;
use steps::{
    clean_organizations, validate_account, validate_achievements, validate_biodata,
    validate_user_type, AccountInput, AchievementDraft, Biodata, FieldErrors, Interests,
    OrganizationDraft, StepInput,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Account,
    UserType,
    Biodata,
    Report,
    Achievements,
    Organizations,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Account => "account",
            Step::UserType => "user_type",
            Step::Biodata => "biodata",
            Step::Report => "report",
            Step::Achievements => "achievements",
            Step::Organizations => "organizations",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StepInput {
    pub fn step(&self) -> Step {
        match self {
            StepInput::Account(_) => Step::Account,
            StepInput::UserType { .. } => Step::UserType,
            StepInput::Biodata(_) => Step::Biodata,
            StepInput::Report => Step::Report,
            StepInput::Achievements => Step::Achievements,
            StepInput::Organizations(_) => Step::Organizations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    FreshRegistration,
    /// Signed-in user filling in missing data. A known user type skips its step.
    CompleteProfile { user_type: Option<UserType> },
}

impl EntryPoint {
    fn steps(&self) -> Vec<Step> {
        let tail = [Step::Biodata, Step::Report, Step::Achievements, Step::Organizations];
        let head: &[Step] = match self {
            EntryPoint::FreshRegistration => &[Step::Account, Step::UserType],
            EntryPoint::CompleteProfile { user_type: None } => &[Step::UserType],
            EntryPoint::CompleteProfile { user_type: Some(_) } => &[],
        };
        head.iter().chain(tail.iter()).copied().collect()
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Expected input for the {expected} step, got {got}")]
    WrongStep { expected: Step, got: Step },

    #[error("Already at the first step")]
    AtFirstStep,

    #[error("The {0} step cannot be skipped")]
    NotSkippable(Step),

    #[error("Invalid input")]
    Invalid(FieldErrors),

    #[error("Wizard is missing {0}")]
    Incomplete(&'static str),

    #[error("Wizard not found or expired")]
    NotFound,

    #[error("This wizard belongs to another account")]
    NotOwner,

    #[error("This wizard is already being submitted")]
    Submitting,

    #[error("At most {0} achievements can be added")]
    TooManyAchievements(usize),

    #[error("Achievement images are too large in total; remove one or use a smaller file")]
    ImageBudgetExceeded,

    #[error("Too many registrations are in progress; please try again shortly")]
    StoreFull,
}

impl From<WizardError> for AppError {
    fn from(e: WizardError) -> Self {
        match e {
            WizardError::Invalid(fields) => AppError::InvalidFields(fields),
            WizardError::NotFound => AppError::NotFound(e.to_string()),
            WizardError::NotOwner => AppError::Forbidden,
            WizardError::Submitting => AppError::Conflict(e.to_string()),
            WizardError::StoreFull => AppError::Busy(e.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Result of a successful "continue".
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Moved(Step),
    /// Account input is valid; the caller has to create the account and
    /// report back through [`Wizard::account_created`].
    SignUpRequired(AccountInput),
    /// All steps are filled in; the caller runs the final write.
    ReadyToSubmit,
}

/// Everything the final write needs, detached from the wizard.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_type: UserType,
    pub biodata: Biodata,
    pub report: ReportSheet,
    pub achievements: Vec<AchievementDraft>,
    pub organizations: Vec<OrganizationDraft>,
    pub interests: Interests,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    pub title: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub step: Step,
    /// 1-based.
    pub position: usize,
    pub total: usize,
    pub steps: Vec<Step>,
    pub signed_in: bool,
    pub user_type: Option<UserType>,
    pub biodata: Option<Biodata>,
    pub report: ReportSheet,
    pub addable_subjects: Vec<&'static str>,
    pub achievements: Vec<AchievementView>,
    pub organizations: Vec<OrganizationDraft>,
    pub interests: Interests,
}

#[derive(Debug, Clone)]
pub struct Wizard {
    steps: Vec<Step>,
    position: usize,
    /// Account the wizard is bound to; only it may drive the wizard.
    owner: Option<Uuid>,
    /// Set while the final write runs.
    submitting: bool,
    user_type: Option<UserType>,
    biodata: Option<Biodata>,
    report: ReportSheet,
    achievements: Vec<AchievementDraft>,
    organizations: Vec<OrganizationDraft>,
    interests: Interests,
}

impl Wizard {
    pub fn new(entry: EntryPoint, owner: Option<Uuid>) -> Self {
        let user_type = match entry {
            EntryPoint::CompleteProfile { user_type } => user_type,
            EntryPoint::FreshRegistration => None,
        };
        Self {
            steps: entry.steps(),
            position: 0,
            owner,
            submitting: false,
            user_type,
            biodata: None,
            report: ReportSheet::default(),
            achievements: Vec::new(),
            organizations: Vec::new(),
            interests: Interests::default(),
        }
    }

    pub fn current_step(&self) -> Step {
        self.steps[self.position]
    }

    /// 1-based position of the current step.
    pub fn position(&self) -> usize {
        self.position + 1
    }

    pub fn total(&self) -> usize {
        self.steps.len()
    }

    pub fn owner(&self) -> Option<Uuid> {
        self.owner
    }

    /// Binds an unowned wizard to the first signed-in caller and refuses
    /// everyone else once it is bound.
    pub fn claim(&mut self, caller: Option<Uuid>) -> Result<(), WizardError> {
        match (self.owner, caller) {
            (Some(owner), caller) if caller != Some(owner) => Err(WizardError::NotOwner),
            (None, Some(caller)) => {
                self.owner = Some(caller);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        if self.submitting {
            Err(WizardError::Submitting)
        } else {
            Ok(())
        }
    }

    fn advance(&mut self) -> Advance {
        if self.position + 1 < self.steps.len() {
            self.position += 1;
            Advance::Moved(self.current_step())
        } else {
            Advance::ReadyToSubmit
        }
    }

    pub fn continue_with(&mut self, input: StepInput) -> Result<Advance, WizardError> {
        self.ensure_open()?;
        let expected = self.current_step();
        if input.step() != expected {
            return Err(WizardError::WrongStep {
                expected,
                got: input.step(),
            });
        }

        match input {
            StepInput::Account(account) => {
                validate_account(&account).map_err(WizardError::Invalid)?;
                return Ok(Advance::SignUpRequired(account));
            }
            StepInput::UserType { user_type } => {
                let user_type = validate_user_type(user_type).map_err(WizardError::Invalid)?;
                if self.user_type != Some(user_type) {
                    // Biodata of the other variant no longer applies.
                    self.biodata = None;
                }
                self.user_type = Some(user_type);
            }
            StepInput::Biodata(input) => {
                let user_type = self.user_type.ok_or(WizardError::Incomplete("a user type"))?;
                let biodata = validate_biodata(user_type, &input).map_err(WizardError::Invalid)?;
                self.report.prepare(&biodata.details);
                self.biodata = Some(biodata);
            }
            StepInput::Report => {
                if !self.report.has_any_score() {
                    return Err(WizardError::Invalid(FieldErrors::from([(
                        "report".to_string(),
                        "Enter at least one score".to_string(),
                    )])));
                }
            }
            StepInput::Achievements => {
                self.achievements =
                    validate_achievements(&self.achievements).map_err(WizardError::Invalid)?;
            }
            StepInput::Organizations(input) => {
                let (organizations, interests) = clean_organizations(input);
                self.organizations = organizations;
                self.interests = interests;
            }
        }
        Ok(self.advance())
    }

    /// Records the account created for a [`Advance::SignUpRequired`], binds
    /// the wizard to it and moves past the account step.
    pub fn account_created(&mut self, identity: &Identity) -> Result<Step, WizardError> {
        self.ensure_open()?;
        if self.current_step() != Step::Account {
            return Err(WizardError::WrongStep {
                expected: self.current_step(),
                got: Step::Account,
            });
        }
        self.owner = Some(identity.id);
        match self.advance() {
            Advance::Moved(step) => Ok(step),
            _ => Ok(self.current_step()),
        }
    }

    /// Steps back; entered data is kept.
    pub fn back(&mut self) -> Result<Step, WizardError> {
        self.ensure_open()?;
        if self.position == 0 {
            return Err(WizardError::AtFirstStep);
        }
        self.position -= 1;
        Ok(self.current_step())
    }

    /// Only the achievements step may be skipped; skipping discards its items.
    pub fn skip(&mut self) -> Result<Step, WizardError> {
        self.ensure_open()?;
        let step = self.current_step();
        if step != Step::Achievements {
            return Err(WizardError::NotSkippable(step));
        }
        self.achievements.clear();
        match self.advance() {
            Advance::Moved(step) => Ok(step),
            _ => Ok(self.current_step()),
        }
    }

    pub fn report_mut(&mut self) -> Result<&mut ReportSheet, WizardError> {
        self.ensure_open()?;
        match self.current_step() {
            Step::Report => Ok(&mut self.report),
            expected => Err(WizardError::WrongStep {
                expected,
                got: Step::Report,
            }),
        }
    }

    pub fn add_achievement(&mut self, draft: AchievementDraft) -> Result<usize, WizardError> {
        self.ensure_open()?;
        match self.current_step() {
            Step::Achievements => {
                if self.achievements.len() >= MAX_ACHIEVEMENTS {
                    return Err(WizardError::TooManyAchievements(MAX_ACHIEVEMENTS));
                }
                let held: usize = self
                    .achievements
                    .iter()
                    .filter_map(|a| a.image.as_ref())
                    .map(|i| i.bytes.len())
                    .sum();
                let incoming = draft.image.as_ref().map_or(0, |i| i.bytes.len());
                if held + incoming > MAX_WIZARD_IMAGE_BYTES {
                    return Err(WizardError::ImageBudgetExceeded);
                }
                self.achievements.push(draft);
                Ok(self.achievements.len())
            }
            expected => Err(WizardError::WrongStep {
                expected,
                got: Step::Achievements,
            }),
        }
    }

    pub fn remove_achievement(
        &mut self,
        index: usize,
    ) -> Result<Option<AchievementDraft>, WizardError> {
        self.ensure_open()?;
        Ok((index < self.achievements.len()).then(|| self.achievements.remove(index)))
    }

    pub fn submission(&self) -> Result<Submission, WizardError> {
        Ok(Submission {
            user_type: self.user_type.ok_or(WizardError::Incomplete("a user type"))?,
            biodata: self
                .biodata
                .clone()
                .ok_or(WizardError::Incomplete("biodata"))?,
            report: self.report.clone(),
            achievements: self.achievements.clone(),
            organizations: self.organizations.clone(),
            interests: self.interests.clone(),
        })
    }

    /// Takes the submission and holds the wizard until
    /// [`Wizard::submission_failed`] or removal. Only one caller gets it.
    pub fn begin_submission(&mut self) -> Result<Submission, WizardError> {
        self.ensure_open()?;
        let submission = self.submission()?;
        self.submitting = true;
        Ok(submission)
    }

    /// Reopens the wizard after a failed final write so the user can retry.
    pub fn submission_failed(&mut self) {
        self.submitting = false;
    }

    pub fn view(&self) -> WizardView {
        WizardView {
            step: self.current_step(),
            position: self.position(),
            total: self.total(),
            steps: self.steps.clone(),
            signed_in: self.owner.is_some(),
            user_type: self.user_type,
            biodata: self.biodata.clone(),
            report: self.report.clone(),
            addable_subjects: self.report.addable_subjects(),
            achievements: self
                .achievements
                .iter()
                .map(|a| AchievementView {
                    title: a.title.clone(),
                    file_name: a.image.as_ref().map(|i| i.file_name.clone()),
                })
                .collect(),
            organizations: self.organizations.clone(),
            interests: self.interests.clone(),
        }
    }
}
