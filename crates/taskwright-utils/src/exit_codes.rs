//! Process exit codes for the `taskwright` CLI.
//!
//! These map directly to spec.md §6's synchronous-run exit codes, with a
//! couple of extra codes for CLI-level failures that never reach a run.

/// Exit code constants for the `taskwright` binary.
///
/// | Code | Constant   | Meaning                                            |
/// |------|------------|-----------------------------------------------------|
/// | 0    | `SUCCESS`  | all eligible tasks finished `done`                 |
/// | 1    | `FAILED`   | one or more tasks ended `failed`                   |
/// | 2    | `ABORTED`  | recovery timeout or run canceled                   |
/// | 3    | `CLI_ARGS` | invalid CLI arguments or configuration             |
/// | 4    | `INTERNAL` | unexpected internal error                          |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: Self = Self(0);
    pub const FAILED: Self = Self(1);
    pub const ABORTED: Self = Self(2);
    pub const CLI_ARGS: Self = Self(3);
    pub const INTERNAL: Self = Self(4);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
    }

    #[test]
    fn codes_are_distinct() {
        let codes = [
            ExitCode::SUCCESS,
            ExitCode::FAILED,
            ExitCode::ABORTED,
            ExitCode::CLI_ARGS,
            ExitCode::INTERNAL,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a.as_i32(), b.as_i32());
            }
        }
    }
}
