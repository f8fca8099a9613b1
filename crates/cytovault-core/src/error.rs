// cytovault-core/src/error.rs
// ============================================================================
// Module: Cytovault Core Errors
// Description: Entity vocabulary and name validation errors.
// Purpose: Provide the shared error building blocks used across stores.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! The catalog and the experiment store report recoverable failures in terms
//! of the entity they concern. [`Entity`] is that vocabulary; [`NameError`]
//! is the synchronous rejection produced by the name validator. Both carry
//! the offending identifier in their rendered message.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

// ============================================================================
// SECTION: Entity
// ============================================================================

/// Catalog entity kinds referenced by typed errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// The singleton experiment row.
    Experiment,
    /// An acquisition channel.
    Channel,
    /// An experimental condition.
    Condition,
    /// A biological replicate within a condition.
    BiologicalReplicate,
    /// A named timepoint.
    Timepoint,
    /// A field of view.
    FieldOfView,
    /// A segmentation run.
    SegmentationRun,
    /// A segmented cell.
    Cell,
    /// A per-cell measurement.
    Measurement,
    /// A threshold run.
    ThresholdRun,
    /// A thresholded particle.
    Particle,
    /// A cell tag.
    Tag,
    /// A generic analysis provenance record.
    AnalysisRun,
}

impl Entity {
    /// Returns the lowercase label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Experiment => "experiment",
            Self::Channel => "channel",
            Self::Condition => "condition",
            Self::BiologicalReplicate => "biological replicate",
            Self::Timepoint => "timepoint",
            Self::FieldOfView => "field of view",
            Self::SegmentationRun => "segmentation run",
            Self::Cell => "cell",
            Self::Measurement => "measurement",
            Self::ThresholdRun => "threshold run",
            Self::Particle => "particle",
            Self::Tag => "tag",
            Self::AnalysisRun => "analysis run",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// SECTION: Name Errors
// ============================================================================

/// Rejection raised by the safe-identifier validator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NameError {
    /// The name was empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Label of the field being validated.
        field: String,
    },
    /// The name contained a `..` path-traversal sequence.
    #[error("{field} '{value}' must not contain '..'")]
    Traversal {
        /// Label of the field being validated.
        field: String,
        /// The offending value.
        value: String,
    },
    /// The name failed the safe-identifier grammar.
    #[error(
        "{field} '{value}' must start with an alphanumeric character, use only alphanumerics, \
         dots, hyphens, and underscores, and be at most 255 characters"
    )]
    Grammar {
        /// Label of the field being validated.
        field: String,
        /// The offending value.
        value: String,
    },
}
