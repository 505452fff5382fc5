//! Lobby code generation and validation.

use crate::types::GameCode;
use rand::Rng;

/// Safe character set for lobby codes (excludes 0/O, 1/I/L to avoid confusion)
pub const CODE_CHARS: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 6;

/// Source of fresh lobby codes.
///
/// Uniqueness against running games is the coordinator's job, not the generator's.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> GameCode;
}

/// Draws codes uniformly from [`CODE_CHARS`]
#[derive(Debug, Clone, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> GameCode {
        let mut rng = rand::rng();
        let code = (0..CODE_LENGTH)
            .map(|_| CODE_CHARS[rng.random_range(0..CODE_CHARS.len())] as char)
            .collect();
        GameCode::from_normalized(code)
    }
}

/// Check length and alphabet membership (expects already upper-cased input)
pub fn is_valid(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| CODE_CHARS.contains(&b))
}

/// Upper-case and validate user input
pub fn normalize(raw: &str) -> Option<GameCode> {
    let upper = raw.trim().to_ascii_uppercase();
    is_valid(&upper).then(|| GameCode::from_normalized(upper))
}
