/// Declares a struct type implementing the [`Labels`] trait.
///
/// Each field becomes one identifying column of a report row, named after the field.
/// The fields must implement [`AsRef<str>`](std::convert::AsRef).
///
/// ```
/// hbm_chase::struct_labels! {
///     struct Run {
///         size: String,
///         banks: &'static str,
///     }
/// }
/// # use hbm_chase::Labels;
/// assert_eq!(Run::names(), ["size", "banks"]);
/// ```
#[macro_export]
macro_rules! struct_labels {
    ($vis:vis struct $Name:ident{
        $($fv:vis $f:ident:$F:ty,)* $(,)?
    }) => {
        $vis struct $Name{
            $($fv $f:$F,)*
        }

        impl $crate::Labels for $Name{
            fn names()->&'static [&'static str]{
                &[
                    $(std::stringify!($f),)*
                ]
            }

            fn values(&self,f:&mut dyn FnMut(&str)){
                $(f(std::convert::AsRef::as_ref(&self.$f));)*
            }
        }
    };
}

/// The identifying columns of a report row.
pub trait Labels {
    /// Returns the static list of label names in order.
    fn names() -> &'static [&'static str];
    /// Calls `f` for each label value, in the same order as [`names`](Self::names).
    fn values(&self, f: &mut dyn FnMut(&str));
}

/// No labels.
impl Labels for () {
    fn names() -> &'static [&'static str] {
        &[]
    }

    fn values(&self, _f: &mut dyn FnMut(&str)) {}
}

#[test]
fn test_macro_order() {
    struct_labels! {
        struct Pair {
            first: String,
            second: &'static str,
        }
    }
    let pair = Pair {
        first: "a".to_string(),
        second: "b",
    };
    let mut seen = Vec::new();
    pair.values(&mut |x| seen.push(x.to_string()));
    assert_eq!(Pair::names(), ["first", "second"]);
    assert_eq!(seen, ["a", "b"]);
}
