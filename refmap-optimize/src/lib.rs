/// Vector function traits and finite difference approximations
pub mod calculus;
/// Newton's method with pluggable line search
pub mod newton;
