use crate::request::{BodyPrintLimit, ReceivedRequest};
use http::Method;
use std::fmt::{self, Display, Formatter};
use std::ops::{
    Range, RangeBounds, RangeFrom, RangeFull, RangeInclusive, RangeTo, RangeToInclusive,
};

/// Specify how many times a request signature is expected to have been received.
///
/// It can be built from a `u64` for an exact count or from any range over `u64`:
///
/// ```rust
/// use servicemock::Times;
///
/// assert_eq!(Times::from(1), Times::once());
/// assert_eq!(Times::from(2..), Times::at_least(2));
/// assert_eq!(Times::from(..=3), Times::at_most(3));
/// assert_eq!(Times::from(0), Times::never());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Times(TimesEnum);

impl Times {
    pub fn once() -> Self {
        Times(TimesEnum::Exact(1))
    }

    pub fn never() -> Self {
        Times(TimesEnum::Exact(0))
    }

    pub fn exactly(n: u64) -> Self {
        Times(TimesEnum::Exact(n))
    }

    pub fn at_least(n: u64) -> Self {
        Times(TimesEnum::RangeFrom(n..))
    }

    pub fn at_most(n: u64) -> Self {
        Times(TimesEnum::RangeToInclusive(..=n))
    }

    /// Inclusive on both ends.
    pub fn between(min: u64, max: u64) -> Self {
        Times(TimesEnum::RangeInclusive(min..=max))
    }

    pub fn contains(&self, n_calls: u64) -> bool {
        match &self.0 {
            TimesEnum::Exact(e) => e == &n_calls,
            TimesEnum::Unbounded(r) => r.contains(&n_calls),
            TimesEnum::Range(r) => r.contains(&n_calls),
            TimesEnum::RangeFrom(r) => r.contains(&n_calls),
            TimesEnum::RangeTo(r) => r.contains(&n_calls),
            TimesEnum::RangeToInclusive(r) => r.contains(&n_calls),
            TimesEnum::RangeInclusive(r) => r.contains(&n_calls),
        }
    }
}

impl Display for Times {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TimesEnum::Exact(e) => write!(f, "== {}", e),
            TimesEnum::Unbounded(_) => write!(f, "0 <= x"),
            TimesEnum::Range(r) => write!(f, "{} <= x < {}", r.start, r.end),
            TimesEnum::RangeFrom(r) => write!(f, "{} <= x", r.start),
            TimesEnum::RangeTo(r) => write!(f, "0 <= x < {}", r.end),
            TimesEnum::RangeToInclusive(r) => write!(f, "0 <= x <= {}", r.end),
            TimesEnum::RangeInclusive(r) => write!(f, "{} <= x <= {}", r.start(), r.end()),
        }
    }
}

// `Box<dyn RangeBounds<u64>>` is not an option: `contains` is generic, hence not object safe.
// This enum wraps every range type we accept, plus exact counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum TimesEnum {
    Exact(u64),
    Unbounded(RangeFull),
    Range(Range<u64>),
    RangeFrom(RangeFrom<u64>),
    RangeTo(RangeTo<u64>),
    RangeToInclusive(RangeToInclusive<u64>),
    RangeInclusive(RangeInclusive<u64>),
}

impl From<u64> for Times {
    fn from(x: u64) -> Self {
        Times(TimesEnum::Exact(x))
    }
}

impl From<RangeFull> for Times {
    fn from(x: RangeFull) -> Self {
        Times(TimesEnum::Unbounded(x))
    }
}

// A quick macro to help easing the implementation pain.
macro_rules! impl_from_for_range {
    ($type_name:ident) => {
        impl From<$type_name<u64>> for Times {
            fn from(r: $type_name<u64>) -> Self {
                Times(TimesEnum::$type_name(r))
            }
        }
    };
}

impl_from_for_range!(Range);
impl_from_for_range!(RangeTo);
impl_from_for_range!(RangeFrom);
impl_from_for_range!(RangeInclusive);
impl_from_for_range!(RangeToInclusive);

/// Returned by the `verify*` methods of [`RestMock`](crate::RestMock) when the number of
/// logged requests matching a signature falls outside the expected [`Times`].
///
/// It carries a snapshot of the request log taken when verification ran.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", self.report())]
pub struct VerificationError {
    pub endpoint: String,
    pub method: Method,
    pub template: String,
    pub matchers: Vec<String>,
    pub expected: Times,
    pub actual: u64,
    pub received_requests: Vec<ReceivedRequest>,
    pub(crate) body_print_limit: BodyPrintLimit,
}

impl VerificationError {
    fn report(&self) -> String {
        let mut report = String::new();
        // Writing into a `String` cannot fail.
        let _ = self.write_report(&mut report);
        report
    }

    fn write_report(&self, f: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            f,
            "Verification failed for {} {} on `{}`.",
            self.method, self.template, self.endpoint
        )?;
        for matcher in &self.matchers {
            writeln!(f, "\tWhere {}", matcher)?;
        }
        writeln!(
            f,
            "\tExpected range of matching incoming requests: {}",
            self.expected
        )?;
        writeln!(f, "\tNumber of matched incoming requests: {}", self.actual)?;
        writeln!(f)?;
        if self.received_requests.is_empty() {
            write!(f, "The endpoint did not receive any request.")
        } else {
            writeln!(f, "Received requests:")?;
            for (index, request) in self.received_requests.iter().enumerate() {
                let mut printed = String::new();
                request.print_with_limit(&mut printed, self.body_print_limit)?;
                writeln!(f, "- Request #{}", index + 1)?;
                for line in printed.trim_end().lines() {
                    writeln!(f, "\t{}", line)?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_request;

    #[test]
    fn named_constructors_accept_the_right_counts() {
        assert!(Times::once().contains(1));
        assert!(!Times::once().contains(2));
        assert!(Times::never().contains(0));
        assert!(!Times::never().contains(1));
        assert!(Times::at_least(2).contains(7));
        assert!(!Times::at_least(2).contains(1));
        assert!(Times::at_most(2).contains(0));
        assert!(!Times::at_most(2).contains(3));
        assert!(Times::between(1, 3).contains(3));
        assert!(!Times::between(1, 3).contains(4));
        assert!(Times::from(..).contains(u64::MAX));
        assert!(!Times::from(1..3).contains(3));
        assert!(Times::from(..3).contains(2));
    }

    #[test]
    fn times_are_displayed_as_ranges() {
        assert_eq!(Times::once().to_string(), "== 1");
        assert_eq!(Times::at_least(1).to_string(), "1 <= x");
        assert_eq!(Times::from(2..5).to_string(), "2 <= x < 5");
        assert_eq!(Times::between(2, 5).to_string(), "2 <= x <= 5");
    }

    #[test]
    fn error_message_lists_the_received_requests() {
        let request = test_request(Method::GET, "/alive", b"");
        let error = VerificationError {
            endpoint: "http://127.0.0.1:8080".into(),
            method: Method::POST,
            template: "/message".into(),
            matchers: vec![],
            expected: Times::once(),
            actual: 0,
            received_requests: vec![request],
            body_print_limit: BodyPrintLimit::Unlimited,
        };

        assert_eq!(
            error.to_string(),
            "Verification failed for POST /message on `http://127.0.0.1:8080`.
\tExpected range of matching incoming requests: == 1
\tNumber of matched incoming requests: 0

Received requests:
- Request #1
\tGET /alive
"
        );
    }

    #[test]
    fn an_empty_log_is_reported_as_such() {
        let error = VerificationError {
            endpoint: "http://127.0.0.1:8080".into(),
            method: Method::GET,
            template: "/alive".into(),
            matchers: vec!["body == \"Parrot\"".into()],
            expected: Times::at_least(1),
            actual: 0,
            received_requests: vec![],
            body_print_limit: BodyPrintLimit::Unlimited,
        };
        let as_error: &dyn std::error::Error = &error;

        assert!(as_error.source().is_none());
        assert_eq!(
            as_error.to_string(),
            "Verification failed for GET /alive on `http://127.0.0.1:8080`.
\tWhere body == \"Parrot\"
\tExpected range of matching incoming requests: 1 <= x
\tNumber of matched incoming requests: 0

The endpoint did not receive any request."
        );
    }
}
