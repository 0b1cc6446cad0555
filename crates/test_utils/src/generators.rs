//! Property-Based Test Generators
//!
//! Provides proptest strategies for failures, rollback policies and call
//! nesting, together with the decision each policy is expected to make.

use persist_kernel::{ErrorClass, FailureAction, TransactionPolicy};
use proptest::prelude::*;

use crate::fixtures::{AppError, SqlTimeoutError, ValidationError};

/// Kinds of failure an advised call can raise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Validation,
    Other,
}

impl FailureKind {
    pub fn into_error(self) -> AppError {
        match self {
            FailureKind::Timeout => AppError::timeout(),
            FailureKind::Validation => AppError::validation("generated"),
            FailureKind::Other => AppError::Other("generated".to_string()),
        }
    }
}

/// Classifiers a generated policy can be built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Any,
    Timeout,
    Validation,
}

impl ClassKind {
    pub fn class(self) -> ErrorClass {
        match self {
            ClassKind::Any => ErrorClass::any(),
            ClassKind::Timeout => ErrorClass::of::<SqlTimeoutError>(),
            ClassKind::Validation => ErrorClass::of::<ValidationError>(),
        }
    }

    pub fn matches(self, failure: FailureKind) -> bool {
        match self {
            ClassKind::Any => true,
            ClassKind::Timeout => failure == FailureKind::Timeout,
            ClassKind::Validation => failure == FailureKind::Validation,
        }
    }
}

/// Plain description of a policy, with the expected decision for a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyShape {
    pub rollback_on: Vec<ClassKind>,
    pub ignore: Vec<ClassKind>,
}

impl PolicyShape {
    pub fn build(&self) -> TransactionPolicy {
        let policy = self
            .rollback_on
            .iter()
            .fold(TransactionPolicy::new(), |policy, kind| policy.rollback_on(kind.class()));
        self.ignore
            .iter()
            .fold(policy, |policy, kind| policy.ignore(kind.class()))
    }

    pub fn expected(&self, failure: FailureKind) -> FailureAction {
        let rolls_back = self.rollback_on.iter().any(|kind| kind.matches(failure));
        let ignored = self.ignore.iter().any(|kind| kind.matches(failure));
        if rolls_back && !ignored {
            FailureAction::Rollback
        } else {
            FailureAction::Commit
        }
    }
}

pub fn failure_strategy() -> impl Strategy<Value = FailureKind> {
    prop_oneof![
        Just(FailureKind::Timeout),
        Just(FailureKind::Validation),
        Just(FailureKind::Other),
    ]
}

pub fn class_strategy() -> impl Strategy<Value = ClassKind> {
    prop_oneof![
        Just(ClassKind::Any),
        Just(ClassKind::Timeout),
        Just(ClassKind::Validation),
    ]
}

/// Policies with up to three rollback and two ignore classifiers
pub fn policy_strategy() -> impl Strategy<Value = PolicyShape> {
    (
        prop::collection::vec(class_strategy(), 0..=3),
        prop::collection::vec(class_strategy(), 0..=2),
    )
        .prop_map(|(rollback_on, ignore)| PolicyShape { rollback_on, ignore })
}

/// Depth of nested advised calls, outermost included
pub fn nesting_depth_strategy() -> impl Strategy<Value = usize> {
    1usize..6
}
