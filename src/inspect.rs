//! NetCDF metadata inspection
//!
//! Prints the structure of a CMIP5 netCDF file and cross-checks the global
//! attributes written by the modelling centres against the file name.

use crate::errors::Result;
use crate::filename::Cmip5FileName;
use netcdf::{AttributeValue, File};
use std::fmt;

/// A global attribute that disagrees with the file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Attribute (or `variable`) that was checked
    pub attribute: String,
    /// Value implied by the file name
    pub expected: String,
    /// Value found in the file, `None` when absent
    pub found: Option<String>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.found {
            Some(found) => write!(
                f,
                "{}: file name says '{}', file has '{}'",
                self.attribute, self.expected, found
            ),
            None => write!(
                f,
                "{}: file name says '{}', file has none",
                self.attribute, self.expected
            ),
        }
    }
}

/// Prints global attributes and variables of a NetCDF file.
pub fn print_metadata(file: &File) -> Result<()> {
    println!("\n===== Global Attributes =====");
    for attr in file.attributes() {
        println!("- {}: {}", attr.name(), format_value(&attr.value()?));
    }

    println!("\n===== Variables =====");
    let mut variables: Vec<_> = file.variables().collect();
    variables.sort_by(|a, b| a.name().cmp(&b.name()));
    for var in variables {
        let dims: Vec<String> = var
            .dimensions()
            .iter()
            .map(|d| format!("{}[{}]", d.name(), d.len()))
            .collect();
        if dims.is_empty() {
            println!("- {} (scalar)", var.name());
        } else {
            println!("- {} ({})", var.name(), dims.join(", "));
        }
    }

    Ok(())
}

/// Compare the CMIP5 global attributes of `file` with its parsed name
pub fn check_consistency(file: &File, name: &Cmip5FileName) -> Result<Vec<Mismatch>> {
    let mut mismatches = Vec::new();

    let mut check = |attribute: &str, expected: &str, found: Option<String>| {
        if found.as_deref() != Some(expected) {
            mismatches.push(Mismatch {
                attribute: attribute.to_string(),
                expected: expected.to_string(),
                found,
            });
        }
    };

    check("model_id", &name.model, global_string(file, "model_id")?);
    check(
        "experiment_id",
        &name.experiment,
        global_string(file, "experiment_id")?,
    );

    // e.g. "Table Amon (26 July 2011) 976b7fd1d9e1be31dddd28f5dc79b7a1"
    let table = global_string(file, "table_id")?.map(|t| {
        let mut words = t.split_whitespace();
        match (words.next(), words.next()) {
            (Some("Table"), Some(id)) => id.to_string(),
            _ => t.clone(),
        }
    });
    check("table_id", &name.mip_table, table);

    let ensemble = match (
        global_int(file, "realization")?,
        global_int(file, "initialization_method")?,
        global_int(file, "physics_version")?,
    ) {
        (Some(r), Some(i), Some(p)) => Some(format!("r{}i{}p{}", r, i, p)),
        _ => None,
    };
    check(
        "realization/initialization_method/physics_version",
        &name.ensemble,
        ensemble,
    );

    let variable = file.variable(&name.variable).map(|v| v.name());
    check("variable", &name.variable, variable);

    Ok(mismatches)
}

fn global_string(file: &File, attr_name: &str) -> Result<Option<String>> {
    match file.attribute(attr_name) {
        Some(attr) => match attr.value()? {
            AttributeValue::Str(s) => Ok(Some(s.trim().to_string())),
            other => Ok(Some(format_value(&other))),
        },
        None => Ok(None),
    }
}

fn global_int(file: &File, attr_name: &str) -> Result<Option<i64>> {
    let Some(attr) = file.attribute(attr_name) else {
        return Ok(None);
    };
    let value = match attr.value()? {
        AttributeValue::Int(v) => Some(i64::from(v)),
        AttributeValue::Short(v) => Some(i64::from(v)),
        AttributeValue::Longlong(v) => Some(v),
        AttributeValue::Uint(v) => Some(i64::from(v)),
        AttributeValue::Ushort(v) => Some(i64::from(v)),
        AttributeValue::Uchar(v) => Some(i64::from(v)),
        AttributeValue::Schar(v) => Some(i64::from(v)),
        AttributeValue::Double(v) if v.fract() == 0.0 => Some(v as i64),
        AttributeValue::Str(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(value)
}

fn format_value(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Str(s) => format!("\"{}\"", s),
        AttributeValue::Strs(ss) => format!("{:?}", ss),
        AttributeValue::Float(f) => f.to_string(),
        AttributeValue::Floats(fs) => format!("{:?}", fs),
        AttributeValue::Double(d) => d.to_string(),
        AttributeValue::Doubles(ds) => format!("{:?}", ds),
        AttributeValue::Int(i) => i.to_string(),
        AttributeValue::Ints(is) => format!("{:?}", is),
        AttributeValue::Short(s) => s.to_string(),
        AttributeValue::Shorts(ss) => format!("{:?}", ss),
        other => format!("{:?}", other),
    }
}
