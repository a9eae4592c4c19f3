/// Declares a BACnet enumeration with a vendor-extensible value space.
///
/// Named values are the ones ASHRAE defines. Unnamed values inside
/// `$proprietary` decode to `Proprietary`, anything else to `Reserved`, so
/// decoding never fails and every value encodes back to the octets it came
/// from. Both carry a `<Name>Raw` newtype holding the wire value.
///
/// ```rust
/// use bacnet_core::service::RejectReason;
///
/// assert_eq!(RejectReason::from(4u8), RejectReason::InvalidTag);
/// assert!(RejectReason::InvalidTag.is_standard());
/// assert!(matches!(RejectReason::from(70u8), RejectReason::Proprietary(raw) if raw.get() == 70));
/// assert_eq!(RejectReason::from(20u8).to_string(), "reserved(20)");
/// assert_eq!(u8::from(RejectReason::from(20u8)), 20);
/// ```
#[macro_export]
macro_rules! generate_custom_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident = $value:literal,)+ }, $unit:ident, $proprietary:expr) => {
        $crate::__private::paste! {
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub enum $name {
                $($variant,)+
                /// Vendor-defined value
                Proprietary([<$name Raw>]),
                /// Value neither standard nor in the vendor range
                Reserved([<$name Raw>]),
            }

            /// Wire value of a proprietary or reserved value
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
            pub struct [<$name Raw>]($unit);

            impl [<$name Raw>] {
                pub fn get(self) -> $unit {
                    self.0
                }
            }

            impl $name {
                pub fn from_raw(raw: $unit) -> Self {
                    match raw {
                        $($value => Self::$variant,)+
                        other if ($proprietary).contains(&other) => {
                            Self::Proprietary([<$name Raw>](other))
                        }
                        other => Self::Reserved([<$name Raw>](other)),
                    }
                }

                pub fn raw(self) -> $unit {
                    match self {
                        $(Self::$variant => $value,)+
                        Self::Proprietary(raw) | Self::Reserved(raw) => raw.get(),
                    }
                }

                /// True for values the standard names
                pub fn is_standard(self) -> bool {
                    !matches!(self, Self::Proprietary(_) | Self::Reserved(_))
                }
            }

            impl From<$unit> for $name {
                fn from(raw: $unit) -> Self {
                    Self::from_raw(raw)
                }
            }

            impl From<$name> for $unit {
                fn from(value: $name) -> Self {
                    value.raw()
                }
            }

            impl std::fmt::Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    match self {
                        $(Self::$variant => f.write_str(stringify!($variant)),)+
                        Self::Proprietary(raw) => write!(f, "proprietary({})", raw.get()),
                        Self::Reserved(raw) => write!(f, "reserved({})", raw.get()),
                    }
                }
            }
        }
    };
}
