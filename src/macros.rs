/// Generate one test per listed [crate::CellKind] variant, binding it to `K` inside the body
#[macro_export]
macro_rules! test_kinds {
  ($name:ident[K: $($kind:ident)|*]() $body:tt ) => {$(
      ::paste::paste! {
          #[test]
          fn [<test_ $name _ $kind:snake>]() {
            #[allow(unused)]
            const K: $crate::CellKind = $crate::CellKind::$kind;
            $body
          }
      }
  )+};
}

#[macro_export]
macro_rules! assert_f64_approx {
    ($l:expr, $r:expr) => {
        assert!(
            ($l - $r).abs() < 1e-9,
            "assertion failed: {} !~ {}",
            $l,
            $r
        )
    };
    ($l:expr, $r:expr, $msg:expr) => {
        assert!(
            ($l - $r).abs() < 1e-9,
            "assertion failed: {} !~ {}: {}",
            $l,
            $r,
            $msg
        )
    };
}
