use subtle::ConstantTimeEq;

/// Compare two byte strings without exiting early on the first differing byte.
///
/// Empty inputs and inputs of different lengths compare unequal straight away.
/// That leaks the length of the inputs through timing, but never how much of
/// their content matched.
pub fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}
