//! Macro that turns table declarations into executable Arrow schemas and batch wrappers.

/// Map DSL token -> Arrow DataType.
#[macro_export]
macro_rules! __ty_to_arrow {
    ( Utf8 ) => { ::arrow::datatypes::DataType::Utf8 };
    ( UInt32 ) => { ::arrow::datatypes::DataType::UInt32 };
    ( Boolean ) => { ::arrow::datatypes::DataType::Boolean };
    ( Float64 ) => { ::arrow::datatypes::DataType::Float64 };
}

/// Map nullability token -> Arrow `nullable` flag.
#[macro_export]
macro_rules! __nullable {
    ( required ) => { false };
    ( nullable ) => { true };
}

/// Declarative table definitions. Generates schemas and batch wrappers.
#[macro_export]
macro_rules! define_tables {
    (
        $(
            table $Name:ident {
                kind: $kind:literal,
                fields: {
                    $( $fname:ident : $fty:ident $null:ident ),* $(,)?
                }
            }
        ),* $(,)?
    ) => {
        $(
            /// Strongly-typed wrapper for the `$Name` table.
            #[derive(Clone, Debug)]
            pub struct $Name {
                inner: ::std::sync::Arc<::arrow::record_batch::RecordBatch>,
            }

            impl $Name {
                pub const KIND: &'static str = $kind;

                /// Column names in schema order.
                pub const COLUMNS: &'static [&'static str] = &[ $( stringify!($fname) ),* ];

                /// Arrow schema for this table.
                pub fn schema() -> ::arrow::datatypes::Schema {
                    let fields = vec![
                        $(
                            ::arrow::datatypes::Field::new(
                                stringify!($fname),
                                $crate::__ty_to_arrow!($fty),
                                $crate::__nullable!($null),
                            ),
                        )*
                    ];
                    ::arrow::datatypes::Schema::new(fields)
                }

                /// Wrap a batch after checking its columns against [`Self::schema`].
                pub fn new(
                    inner: ::std::sync::Arc<::arrow::record_batch::RecordBatch>,
                ) -> ::std::result::Result<Self, $crate::SchemaError> {
                    $crate::macros::__check_columns(
                        Self::KIND,
                        &Self::schema(),
                        inner.schema().as_ref(),
                    )?;
                    Ok(Self { inner })
                }

                /// Underlying Arrow batch.
                pub fn inner(&self) -> &::std::sync::Arc<::arrow::record_batch::RecordBatch> {
                    &self.inner
                }

                pub fn into_inner(self) -> ::std::sync::Arc<::arrow::record_batch::RecordBatch> {
                    self.inner
                }
            }
        )*
    };
}

/// Runtime check that `actual` carries the declared columns in order with
/// matching types. Nullability is not compared: readers such as the CSV
/// reader mark every column nullable.
pub fn __check_columns(
    table: &str,
    expected: &::arrow::datatypes::Schema,
    actual: &::arrow::datatypes::Schema,
) -> Result<(), crate::SchemaError> {
    if expected.fields().len() != actual.fields().len() {
        return Err(crate::SchemaError::ColumnCount {
            table: table.to_string(),
            expected: expected.fields().len(),
            actual: actual.fields().len(),
        });
    }
    for (want, got) in expected.fields().iter().zip(actual.fields().iter()) {
        if want.name() != got.name() || want.data_type() != got.data_type() {
            return Err(crate::SchemaError::Column {
                table: table.to_string(),
                expected: format!("{}:{}", want.name(), want.data_type()),
                actual: format!("{}:{}", got.name(), got.data_type()),
            });
        }
    }
    Ok(())
}
