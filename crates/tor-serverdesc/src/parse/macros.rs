//! Macros for declaring document keywords.

/// Declare an enumeration of keywords, and implement `Keyword` for it.
///
/// Each variant lists one or more spellings.  Spellings that start
/// with `@` are annotations.  Two catch-all variants, `UNRECOGNIZED`
/// and `ANN_UNRECOGNIZED`, are added at the end.
///
/// ```ignore
/// decl_keyword! {
///     Rule {
///         "allow" | "deny" => RULE,
///         "@note" => ANN_NOTE,
///     }
/// }
///
/// assert_eq!(Rule::from_str("deny"), Rule::RULE);
/// assert_eq!(Rule::from_str("@other"), Rule::ANN_UNRECOGNIZED);
/// ```
macro_rules! decl_keyword {
    { $(#[$meta:meta])* $v:vis $name:ident {
        $( $($s:literal)|+ => $i:ident ),* $(,)?
    } } => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[allow(non_camel_case_types, clippy::upper_case_acronyms)]
        $v enum $name {
            $( $i, )*
            UNRECOGNIZED,
            ANN_UNRECOGNIZED,
        }

        impl $crate::parse::keyword::Keyword for $name {
            fn from_str(s: &str) -> Self {
                // Built at compile time.
                static SPELLINGS: phf::Map<&'static str, $name> = phf::phf_map! {
                    $( $( $s => $name::$i, )+ )*
                };
                match SPELLINGS.get(s) {
                    Some(k) => *k,
                    None if s.starts_with('@') => $name::ANN_UNRECOGNIZED,
                    None => $name::UNRECOGNIZED,
                }
            }
            fn to_str(self) -> &'static str {
                match self {
                    $( $name::$i => decl_keyword!(@spelling $($s),+), )*
                    $name::UNRECOGNIZED => "<unrecognized>",
                    $name::ANN_UNRECOGNIZED => "<unrecognized annotation>",
                }
            }
            fn idx(self) -> usize {
                self as usize
            }
            fn n_vals() -> usize {
                $name::ANN_UNRECOGNIZED as usize + 1
            }
            fn unrecognized() -> Self {
                $name::UNRECOGNIZED
            }
            fn ann_unrecognized() -> Self {
                $name::ANN_UNRECOGNIZED
            }
        }
    };
    (@spelling $s:literal) => { $s };
    (@spelling $s:literal, $($rest:literal),+) => {
        concat!($s, "/", decl_keyword!(@spelling $($rest),+))
    };
}
