use std::collections::HashSet;

use rand::Rng;

/// Length of every ticket code.
pub const CODE_LENGTH: usize = 6;

/// Characters a ticket code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Produces ticket codes that are unique within one issuance batch.
///
/// Codes are only checked against the set handed in, so two sessions may
/// in principle receive the same code.
pub struct CodeGenerator<R> {
    rng: R,
}

impl CodeGenerator<rand::rngs::ThreadRng> {
    pub fn new() -> Self {
        Self::with_rng(rand::thread_rng())
    }
}

impl Default for CodeGenerator<rand::rngs::ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> CodeGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Samples codes until one is absent from `existing`, records it there
    /// and returns it.
    pub fn generate(&mut self, existing: &mut HashSet<String>) -> String {
        loop {
            let code = self.sample();
            if existing.insert(code.clone()) {
                return code;
            }
        }
    }

    fn sample(&mut self) -> String {
        (0..CODE_LENGTH)
            .map(|_| CODE_ALPHABET[self.rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Trims and uppercases a code typed or scanned by an operator.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}
