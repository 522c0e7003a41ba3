// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Tabular input and output.
//!
//! A [`Table`] is a header plus string rows.  Sets, relations and
//! parameters are loaded from named columns; with the `file_io` feature
//! tables are read from CSV and scenario results are written back out.

use std::collections::HashSet;

use crate::common::{Key, Result};
use crate::data_err;
use crate::datamodel::DataModel;
#[cfg(feature = "file_io")]
use crate::scenario::{BatchReport, ResultSchema};

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Table {
            name: name.to_owned(),
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            rows: vec![],
        }
    }

    pub fn row(mut self, fields: &[&str]) -> Self {
        self.rows.push(fields.iter().map(|f| (*f).to_owned()).collect());
        self
    }

    pub fn column(&self, name: &str) -> Result<usize> {
        match self.columns.iter().position(|c| c.trim() == name) {
            Some(i) => Ok(i),
            None => data_err!(
                BadTable,
                format!("table '{}' has no column '{name}'", self.name)
            ),
        }
    }

    fn field<'a>(&self, row: &'a [String], line: usize, column: usize) -> Result<&'a str> {
        match row.get(column) {
            Some(field) => Ok(field.trim()),
            None => data_err!(
                BadTable,
                format!("table '{}' row {}: missing field {column}", self.name, line + 1)
            ),
        }
    }

    fn keys(&self, columns: &[&str]) -> Result<Vec<Key>> {
        let offsets = columns
            .iter()
            .map(|c| self.column(c))
            .collect::<Result<Vec<_>>>()?;
        let mut keys = Vec::with_capacity(self.rows.len());
        for (line, row) in self.rows.iter().enumerate() {
            let mut key = Key::new();
            for &col in offsets.iter() {
                key.push(self.field(row, line, col)?.to_owned());
            }
            keys.push(key);
        }
        Ok(keys)
    }

    /// Distinct values of `column`, in order of first appearance.
    pub fn distinct(&self, column: &str) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut values = vec![];
        for key in self.keys(&[column])? {
            let value = key[0].clone();
            if seen.insert(value.clone()) {
                values.push(value);
            }
        }
        Ok(values)
    }

    pub fn load_set(&self, data: &mut DataModel, name: &str, column: &str) -> Result<()> {
        data.define_set(name, &self.distinct(column)?)
    }

    /// One tuple per row, read from `columns`.
    pub fn load_relation(
        &self,
        data: &mut DataModel,
        name: &str,
        domain: &[&str],
        columns: &[&str],
    ) -> Result<()> {
        data.define_relation(name, domain, &self.keys(columns)?)
    }

    /// Read `value` under the key formed by `key_columns`.  Empty value
    /// fields are skipped; anything else must parse as a number.
    pub fn load_parameter(
        &self,
        data: &mut DataModel,
        name: &str,
        domain: &[&str],
        key_columns: &[&str],
        value: &str,
    ) -> Result<()> {
        let keys = self.keys(key_columns)?;
        let col = self.column(value)?;
        let mut records = Vec::with_capacity(keys.len());
        for (line, (row, key)) in self.rows.iter().zip(keys).enumerate() {
            let field = self.field(row, line, col)?;
            if field.is_empty() {
                continue;
            }
            match field.parse::<f64>() {
                Ok(v) => records.push((key, v)),
                Err(_) => {
                    return data_err!(
                        BadTable,
                        format!(
                            "table '{}' row {}: '{field}' in column '{value}' is not a number",
                            self.name,
                            line + 1
                        )
                    );
                }
            }
        }
        data.define_parameter(name, domain, &records)
    }
}

#[cfg(feature = "file_io")]
fn csv_err(context: &str, err: csv::Error) -> crate::common::Error {
    crate::common::Error::new(
        crate::common::ErrorKind::Domain,
        crate::common::ErrorCode::BadTable,
        Some(format!("{context}: {err}")),
    )
}

/// Read a CSV file with a header row.  The table is named after the file
/// stem.
#[cfg(feature = "file_io")]
pub fn read_table_csv(path: &std::path::Path) -> Result<Table> {
    let context = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| csv_err(&context, err))?;
    let columns = rdr
        .headers()
        .map_err(|err| csv_err(&context, err))?
        .iter()
        .map(|h| h.to_owned())
        .collect();
    let mut rows = vec![];
    for record in rdr.records() {
        let record = record.map_err(|err| csv_err(&context, err))?;
        rows.push(record.iter().map(|f| f.to_owned()).collect());
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    tracing::debug!(
        component = "table",
        operation = "read_csv",
        table = %name,
        rows = rows.len(),
        "Read table"
    );
    Ok(Table {
        name,
        columns,
        rows,
    })
}

/// One row per solved scenario: the aggregates, then each price field in
/// schema order.  Skipped scenarios are not written.
#[cfg(feature = "file_io")]
pub fn write_records_csv<W: std::io::Write>(
    writer: W,
    schema: &ResultSchema,
    report: &BatchReport,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec![
        "scenario".to_owned(),
        "iterations".to_owned(),
        "residual".to_owned(),
        "total_quantity".to_owned(),
        "total_externality".to_owned(),
    ];
    header.extend(schema.price_names().map(|n| n.to_owned()));
    wtr.write_record(&header).map_err(|err| csv_err("results", err))?;

    for record in report.records.iter() {
        let mut row = vec![
            record.scenario.clone(),
            record.iterations.to_string(),
            record.residual.to_string(),
            record.total_quantity.to_string(),
            record.total_externality.to_string(),
        ];
        for name in schema.price_names() {
            row.push(record.price(name).map(|v| v.to_string()).unwrap_or_default());
        }
        wtr.write_record(&row).map_err(|err| csv_err("results", err))?;
    }
    wtr.flush()
        .map_err(|err| csv_err("results", csv::Error::from(err)))?;
    Ok(())
}

/// Long-format levels: `scenario,variable,key,value`.
#[cfg(feature = "file_io")]
pub fn write_levels_csv<W: std::io::Write>(writer: W, report: &BatchReport) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for level in report.levels.iter() {
        wtr.serialize(level).map_err(|err| csv_err("results", err))?;
    }
    wtr.flush()
        .map_err(|err| csv_err("results", csv::Error::from(err)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, ErrorKind};

    fn plants() -> Table {
        Table::new("plants", &["plant", "tech", "cap"])
            .row(&["p1", "bof", "60"])
            .row(&["p2", "eaf", "45"])
            .row(&["p3", "dri", ""])
    }

    #[test]
    fn test_load() {
        let table = plants();
        let mut data = DataModel::new();
        table.load_set(&mut data, "i", "plant").unwrap();
        table.load_set(&mut data, "t", "tech").unwrap();
        table.load_relation(&mut data, "it", &["i", "t"], &["plant", "tech"]).unwrap();
        table.load_parameter(&mut data, "ylim", &["i"], &["plant"], "cap").unwrap();

        assert_eq!(3, data.set("i").unwrap().len());
        assert!(data.set("it").unwrap().contains(&["p2".to_owned(), "eaf".to_owned()]));
        assert_eq!(45.0, data.param_value("ylim", &["p2"]).unwrap());
        // blank field is an absent record
        assert_eq!(0.0, data.param_value("ylim", &["p3"]).unwrap());
    }

    #[test]
    fn test_bad_tables() {
        let mut data = DataModel::new();
        let err = plants().load_set(&mut data, "i", "name").unwrap_err();
        assert_eq!(ErrorKind::Domain, err.kind);
        assert_eq!(ErrorCode::BadTable, err.code);

        plants().load_set(&mut data, "i", "plant").unwrap();
        let table = Table::new("caps", &["plant", "cap"]).row(&["p1", "sixty"]);
        let err = table
            .load_parameter(&mut data, "ylim", &["i"], &["plant"], "cap")
            .unwrap_err();
        assert_eq!(ErrorCode::BadTable, err.code);

        // a plant that is not in the set
        let table = Table::new("caps", &["plant", "cap"]).row(&["p9", "1"]);
        let err = table
            .load_parameter(&mut data, "ylim", &["i"], &["plant"], "cap")
            .unwrap_err();
        assert_eq!(ErrorCode::NotInDomain, err.code);
    }

    #[cfg(feature = "file_io")]
    #[test]
    fn test_read_csv() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factors.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "factor, vbar").unwrap();
        writeln!(file, "coal, 100").unwrap();
        writeln!(file, "elec, 60").unwrap();
        drop(file);

        let table = read_table_csv(&path).unwrap();
        assert_eq!("factors", table.name);
        assert_eq!(vec!["factor", "vbar"], table.columns);
        let mut data = DataModel::new();
        table.load_set(&mut data, "f", "factor").unwrap();
        table.load_parameter(&mut data, "vbar", &["f"], &["factor"], "vbar").unwrap();
        assert_eq!(60.0, data.param_value("vbar", &["elec"]).unwrap());
    }

    #[cfg(feature = "file_io")]
    #[test]
    fn test_write_records() {
        use crate::expr::num;
        use crate::scenario::{LevelRecord, ResultRecord};

        let schema = ResultSchema::new(num(0.0), num(0.0))
            .price("steel_price", num(0.0))
            .price("carbon_price", num(0.0));
        let report = BatchReport {
            records: vec![ResultRecord {
                scenario: "Reference".to_owned(),
                iterations: 0,
                residual: 0.0,
                total_quantity: 100.0,
                total_externality: 158.25,
                prices: vec![("steel_price".to_owned(), 112.0)],
            }],
            levels: vec![LevelRecord {
                scenario: "Reference".to_owned(),
                variable: "Y".to_owned(),
                key: "p1".to_owned(),
                value: 55.0,
            }],
            failures: vec![],
        };

        let mut out = vec![];
        write_records_csv(&mut out, &schema, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            Some(
                "scenario,iterations,residual,total_quantity,total_externality,\
                 steel_price,carbon_price"
            ),
            lines.next()
        );
        // a missing price is an empty field
        assert_eq!(Some("Reference,0,0,100,158.25,112,"), lines.next());

        let mut out = vec![];
        write_levels_csv(&mut out, &report).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!("scenario,variable,key,value\nReference,Y,p1,55.0\n", text);
    }
}
