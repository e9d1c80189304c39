// Copyright (c) 2026 Bountyy Oy. All rights reserved.
// This software is proprietary and confidential.

//! Capture rules: which observed traffic gets uploaded

mod matcher;
mod registry;

pub use matcher::{GlobMatcher, MatcherKind, PatternMatcher, RegexMatcher, SubstringMatcher};
pub use registry::{CaptureRule, RuleRegistry};
