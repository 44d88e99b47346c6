//! Registration of integration tests.
//!
//! Tests are plain functions collected at link time into
//! [`INTEGRATION_TESTS`] with the [`integration_test!`] macro, then handed
//! to libtest-mimic by the test binary.

use linkme::distributed_slice;

pub type TestFn = fn() -> color_eyre::Result<()>;

/// A single registered test.
#[derive(Debug)]
pub struct IntegrationTest {
    pub name: &'static str,
    pub f: TestFn,
}

impl IntegrationTest {
    pub const fn new(name: &'static str, f: TestFn) -> Self {
        Self { name, f }
    }
}

// linkme uses manual link sections, which the unsafe_code lint flags
#[allow(unsafe_code)]
#[distributed_slice]
pub static INTEGRATION_TESTS: [IntegrationTest];

/// Register a test function, e.g. `integration_test!(test_args_default);`
#[macro_export]
macro_rules! integration_test {
    ($test_fn:ident) => {
        const _: () = {
            #[allow(unsafe_code)]
            #[::linkme::distributed_slice($crate::INTEGRATION_TESTS)]
            static TEST: $crate::IntegrationTest =
                $crate::IntegrationTest::new(stringify!($test_fn), $test_fn);
        };
    };
}
