/// Generates a non-exhaustive enum mapping variants to wire-format names.
///
/// Produces the enum, `as_str()`, an exact-match `from_wire()`, an `ALL`
/// slice of every variant, and the `Display`, `AsRef<str>` and
/// case-insensitive `FromStr` impls. The parse
/// error type is declared by the caller as a tuple struct over `String`.
///
/// ```ignore
/// define_header_enum! {
///     error_type: ParseThingError,
///     /// Doc comment for the enum.
///     pub enum Thing {
///         Foo => "Foo-Wire",
///         Bar => "bar_wire",
///     }
/// }
/// ```
macro_rules! define_header_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$Name] = &[ $( $Name::$variant, )+ ];

            /// Wire-format name string.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }

            /// Variant whose wire name is exactly `s`.
            pub fn from_wire(s: &str) -> Option<Self> {
                match s {
                    $( $wire => Some($Name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| s.eq_ignore_ascii_case(v.as_str()))
                    .ok_or_else(|| $Err(s.to_string()))
            }
        }
    };
}
