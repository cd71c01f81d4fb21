//! Test macros for NonZero newtype wrappers
//!
//! Reusable test generators for the size and limit newtypes in
//! [`crate::types`].

/// Generate standard tests for a NonZero newtype wrapper
///
/// # Arguments
/// * `$type_name` - The newtype struct name (e.g., `MaxPoolSize`)
/// * `$default_value` - Expected value of the DEFAULT constant
/// * `$test_value` - A valid non-zero value different from the default
///
/// # Generated Tests
/// - `test_default` - Verifies DEFAULT constant value
/// - `test_new_valid` - Tests creating with valid non-zero value
/// - `test_new_zero_rejected` - Verifies zero returns None
/// - `test_clone_equality` - Tests Clone and PartialEq
/// - `test_ordering` - Tests Ord between default and test value
///
/// # Example
/// ```ignore
/// test_nonzero_newtype!(MaxPoolSize, 10, 25);
/// ```
#[macro_export]
macro_rules! test_nonzero_newtype {
    ($type_name:ident, $default_value:expr, $test_value:expr) => {
        #[test]
        fn test_default() {
            assert_eq!($type_name::DEFAULT.get(), $default_value);
        }

        #[test]
        fn test_new_valid() {
            let value = $type_name::new($test_value).unwrap();
            assert_eq!(value.get(), $test_value);
        }

        #[test]
        fn test_new_zero_rejected() {
            assert!($type_name::new(0).is_none());
        }

        #[test]
        fn test_clone_equality() {
            let val1 = $type_name::new($test_value).unwrap();
            let val2 = val1.clone();
            let val3 = $type_name::new($test_value).unwrap();
            let val4 = $type_name::new($default_value).unwrap();

            assert_eq!(val1, val2);
            assert_eq!(val1, val3);
            assert_ne!(val1, val4);
        }

        #[test]
        fn test_ordering() {
            let a = $type_name::new($test_value).unwrap();
            let b = $type_name::DEFAULT;
            assert_eq!(a.cmp(&b), a.get().cmp(&b.get()));
        }

        #[test]
        fn test_display_matches_inner() {
            let value = $type_name::new($test_value).unwrap();
            assert_eq!(value.to_string(), $test_value.to_string());
        }
    };
}
