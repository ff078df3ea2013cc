//! Template interpolation
//!
//! This module provides:
//! - The token substitution engine (`Interpolator`) for `$[name]` placeholders
//! - The customizer chain that contributes token values before substitution
//! - Built-in customizers (`customizers`)

pub mod customizers;
pub mod interpolate;

pub use customizers::{EnvironmentCustomizer, ServerInfoCustomizer, UserTokenCustomizer};
pub use interpolate::{
    Customizer, CustomizerChain, InterpolationContext, InterpolationError, Interpolator,
    UnknownTokenPolicy, END_EXPR, START_EXPR,
};
