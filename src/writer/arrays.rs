//! Nested column encoders shared by the output shapes

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, ListArray, ListBuilder,
    StringArray, StringBuilder, StructArray,
};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, FieldRef, Fields, Int32Type};

use crate::loaders::Intensity;
use crate::mztab::Modification;

use super::WriterError;

/// Item field of a list column
pub(crate) fn list_item(data_type: DataType) -> FieldRef {
    Arc::new(Field::new("item", data_type, true))
}

/// `list<utf8>`
pub(crate) fn string_list_type() -> DataType {
    DataType::List(list_item(DataType::Utf8))
}

fn modification_fields() -> Fields {
    Fields::from(vec![
        Field::new("positions", DataType::List(list_item(DataType::Int32)), false),
        Field::new("accession", DataType::Utf8, false),
        Field::new("mass_delta", DataType::Float64, true),
    ])
}

/// `list<struct{positions, accession, mass_delta}>`
pub(crate) fn modification_list_type() -> DataType {
    DataType::List(list_item(DataType::Struct(modification_fields())))
}

fn intensity_fields() -> Fields {
    Fields::from(vec![
        Field::new("sample_accession", DataType::Utf8, true),
        Field::new("channel", DataType::Utf8, true),
        Field::new("intensity", DataType::Float64, true),
    ])
}

/// `list<struct{sample_accession, channel, intensity}>`
pub(crate) fn intensity_list_type() -> DataType {
    DataType::List(list_item(DataType::Struct(intensity_fields())))
}

pub(crate) fn strings<S: AsRef<str>>(values: impl Iterator<Item = S>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

pub(crate) fn optional_strings<S: AsRef<str>>(values: impl Iterator<Item = Option<S>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

pub(crate) fn int32s(values: impl Iterator<Item = i32>) -> ArrayRef {
    Arc::new(Int32Array::from_iter_values(values))
}

pub(crate) fn optional_int32s(values: impl Iterator<Item = Option<i32>>) -> ArrayRef {
    Arc::new(values.collect::<Int32Array>())
}

pub(crate) fn optional_int64s(values: impl Iterator<Item = Option<i64>>) -> ArrayRef {
    Arc::new(values.collect::<Int64Array>())
}

pub(crate) fn optional_float64s(values: impl Iterator<Item = Option<f64>>) -> ArrayRef {
    Arc::new(values.collect::<Float64Array>())
}

pub(crate) fn booleans(values: impl Iterator<Item = bool>) -> ArrayRef {
    Arc::new(values.map(Some).collect::<BooleanArray>())
}

/// Missing and disabled intensities both become null
pub(crate) fn intensities(values: impl Iterator<Item = Option<Intensity>>) -> ArrayRef {
    optional_float64s(values.map(|i| i.and_then(Intensity::value)))
}

pub(crate) fn string_lists<'a>(lists: impl Iterator<Item = &'a [String]>) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for list in lists {
        for value in list {
            builder.values().append_value(value);
        }
        builder.append(true);
    }
    Arc::new(builder.finish())
}

fn offsets(lengths: &[usize]) -> Result<OffsetBuffer<i32>, WriterError> {
    let total: usize = lengths.iter().sum();
    if i32::try_from(total).is_err() {
        return Err(WriterError::InvalidData(format!(
            "{} nested values exceed the list offset range",
            total
        )));
    }
    Ok(OffsetBuffer::from_lengths(lengths.iter().copied()))
}

pub(crate) fn modification_lists<'a>(
    lists: impl Iterator<Item = &'a [Modification]>,
) -> Result<ArrayRef, WriterError> {
    let mut lengths = Vec::new();
    let mut positions: Vec<Option<Vec<Option<i32>>>> = Vec::new();
    let mut accessions = Vec::new();
    let mut masses = Vec::new();

    for list in lists {
        lengths.push(list.len());
        for modification in list {
            let mut sites = Vec::with_capacity(modification.positions.len());
            for &p in &modification.positions {
                let p = i32::try_from(p).map_err(|_| {
                    WriterError::InvalidData(format!("modification position {} out of range", p))
                })?;
                sites.push(Some(p));
            }
            positions.push(Some(sites));
            accessions.push(modification.accession.as_str());
            masses.push(modification.mass_delta);
        }
    }

    let values = StructArray::try_new(
        modification_fields(),
        vec![
            Arc::new(ListArray::from_iter_primitive::<Int32Type, _, _>(positions)) as ArrayRef,
            strings(accessions.into_iter()),
            optional_float64s(masses.into_iter()),
        ],
        None,
    )?;
    let list = ListArray::try_new(
        list_item(DataType::Struct(modification_fields())),
        offsets(&lengths)?,
        Arc::new(values),
        None,
    )?;
    Ok(Arc::new(list))
}

/// One measured value of a feature
pub(crate) struct IntensityCell<'a> {
    pub sample_accession: Option<&'a str>,
    pub channel: Option<&'a str>,
    pub intensity: Intensity,
}

pub(crate) fn intensity_lists<'a>(
    lists: impl Iterator<Item = Vec<IntensityCell<'a>>>,
) -> Result<ArrayRef, WriterError> {
    let mut lengths = Vec::new();
    let mut samples = Vec::new();
    let mut channels = Vec::new();
    let mut values = Vec::new();

    for list in lists {
        lengths.push(list.len());
        for cell in list {
            samples.push(cell.sample_accession);
            channels.push(cell.channel);
            values.push(cell.intensity.value());
        }
    }

    let items = StructArray::try_new(
        intensity_fields(),
        vec![
            optional_strings(samples.into_iter()),
            optional_strings(channels.into_iter()),
            optional_float64s(values.into_iter()),
        ],
        None,
    )?;
    let list = ListArray::try_new(
        list_item(DataType::Struct(intensity_fields())),
        offsets(&lengths)?,
        Arc::new(items),
        None,
    )?;
    Ok(Arc::new(list))
}
