//! CSV, JSON and YAML converters.

use async_trait::async_trait;
use serde_json::Value;

use super::{ConvertError, Converted, Converter, ConverterInput, ConverterKind, title_from_name};

/// Renders CSV as a Markdown table; the first row is the header.
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvConverter;

#[async_trait]
impl Converter for CsvConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let text = input.text(kind)?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| ConvertError::malformed(input.name, "csv", e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| ConvertError::malformed(input.name, "csv", e))?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        let title = title_from_name(input.name);
        if headers.iter().all(String::is_empty) && rows.is_empty() {
            return Ok(Converted::markdown(format!("# {title}\n\n_Empty file._\n")));
        }

        Ok(Converted::markdown(format!(
            "# {title}\n\n{}",
            markdown_table(&headers, &rows)
        )))
    }
}

/// Renders JSON arrays of objects as tables, anything else as a fenced block.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonConverter;

#[async_trait]
impl Converter for JsonConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let text = input.text(kind)?;
        let value: Value =
            serde_json::from_str(text).map_err(|e| ConvertError::malformed(input.name, "json", e))?;
        let title = title_from_name(input.name);

        if let Some(table) = object_array_table(&value) {
            return Ok(Converted::markdown(format!("# {title}\n\n{table}")));
        }

        let pretty = serde_json::to_string_pretty(&value)
            .map_err(|e| ConvertError::internal(e.to_string()))?;
        Ok(Converted::markdown(format!(
            "# {title}\n\n```json\n{pretty}\n```\n"
        )))
    }
}

/// Validates YAML and wraps it in a fenced block.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlConverter;

#[async_trait]
impl Converter for YamlConverter {
    async fn convert(
        &self,
        kind: ConverterKind,
        input: ConverterInput<'_>,
    ) -> Result<Converted, ConvertError> {
        let text = input.text(kind)?;
        serde_yaml::from_str::<serde_yaml::Value>(text)
            .map_err(|e| ConvertError::malformed(input.name, "yaml", e))?;
        let title = title_from_name(input.name);
        Ok(Converted::markdown(format!(
            "# {title}\n\n```yaml\n{}\n```\n",
            text.trim_end()
        )))
    }
}

fn object_array_table(value: &Value) -> Option<String> {
    let items = value.as_array()?;
    if items.is_empty() || !items.iter().all(Value::is_object) {
        return None;
    }

    let mut headers: Vec<String> = Vec::new();
    for item in items {
        for key in item.as_object()?.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let rows: Vec<Vec<String>> = items
        .iter()
        .filter_map(Value::as_object)
        .map(|object| {
            headers
                .iter()
                .map(|key| match object.get(key) {
                    None | Some(Value::Null) => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                })
                .collect()
        })
        .collect();

    Some(markdown_table(&headers, &rows))
}

/// Renders a Markdown table, padding short rows and escaping pipes.
pub(crate) fn markdown_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let width = rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0)
        .max(1);

    let render_row = |cells: &[String]| {
        let mut line = String::from("|");
        for index in 0..width {
            let cell = cells.get(index).map_or("", String::as_str);
            line.push(' ');
            line.push_str(&escape_cell(cell));
            line.push_str(" |");
        }
        line.push('\n');
        line
    };

    let mut table = render_row(headers);
    table.push('|');
    for _ in 0..width {
        table.push_str(" --- |");
    }
    table.push('\n');
    for row in rows {
        table.push_str(&render_row(row));
    }
    table
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|").replace(['\r', '\n'], " ")
}
