/// The full path of the enclosing function.
#[macro_export]
macro_rules! function {
    () => {{
        fn _f() {}
        fn _type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = _type_name_of(_f);
        // strip "::_f"
        &name[..name.len() - 4]
    }};
}

/// The enclosing function name, without its module path.
#[macro_export]
macro_rules! short_function {
    () => {{
        let name: &'static str = $crate::function!();
        match name.rfind(':') {
            Some(pos) => &name[pos + 1..],
            None => name,
        }
    }};
}

/// `name: value` pairs of the arguments, for logging.  One pair per line
/// with the `log_pretty_print` feature.
#[macro_export]
macro_rules! vals_str {
    ( $( $x:expr ),* ) => {{
        let pairs: Vec<String> = vec![$(
            if cfg!(feature = "log_pretty_print") {
                format!("\n{}: {:#?}", stringify!($x), $x)
            } else {
                format!("{}: {:?}", stringify!($x), $x)
            }
        ),*];
        pairs.join(if cfg!(feature = "log_pretty_print") { "," } else { ", " })
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn function_name_test() {
        assert_eq!(short_function!(), "function_name_test");
        assert!(function!().ends_with("macro_logger::tests::function_name_test"));
    }

    #[test]
    fn vals_str_test() {
        let amount = 5u64;
        let label = "x";
        if !cfg!(feature = "log_pretty_print") {
            assert_eq!(vals_str!(amount, label), "amount: 5, label: \"x\"");
        }
    }
}
