//! Écrivain GeoJSON avec geozero (streaming)
//!
//! Implémente `FeatureWriter`: l'en-tête de la FeatureCollection est écrit à
//! l'ouverture, chaque élément est encodé dans un tampon puis ajouté d'un
//! bloc, de sorte qu'un refus ne laisse pas de feature tronquée.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use geo::Geometry;
use geozero::geojson::GeoJsonWriter;
use geozero::GeozeroGeometry;
use tracing::trace;
use vegmap::{Crs, ElementId, FeatureWriter, FieldValue, FlatAttributes, WriteRejection};

/// Écrivain de FeatureCollection GeoJSON
pub struct GeoJsonFeatureWriter<W: Write> {
    writer: W,
    open: bool,
    written: usize,
}

impl GeoJsonFeatureWriter<BufWriter<File>> {
    /// Crée le fichier de sortie
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .context(format!("Failed to create file: {}", path.display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> GeoJsonFeatureWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            open: false,
            written: 0,
        }
    }

    /// Nombre de features écrites
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> FeatureWriter for GeoJsonFeatureWriter<W> {
    fn begin(&mut self, crs: Crs) -> Result<(), WriteRejection> {
        // Header FeatureCollection avec CRS
        write!(
            self.writer,
            r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
            crs.epsg
        )
        .map_err(|e| WriteRejection::new(e.to_string()))?;
        self.open = true;
        Ok(())
    }

    fn write(
        &mut self,
        id: &ElementId,
        geometry: &Geometry,
        attributes: &FlatAttributes,
    ) -> Result<(), WriteRejection> {
        if !self.open {
            return Err(WriteRejection::new("container is not open"));
        }

        let mut buffer = Vec::with_capacity(1024);
        if self.written > 0 {
            buffer.push(b',');
        }
        write_feature(&mut buffer, id, geometry, attributes)
            .map_err(|e| WriteRejection::new(e.to_string()))?;
        self.writer
            .write_all(&buffer)
            .map_err(|e| WriteRejection::new(e.to_string()))?;

        self.written += 1;
        trace!(element = %id, bytes = buffer.len(), "Feature written");
        Ok(())
    }

    fn finish(&mut self) -> Result<(), WriteRejection> {
        if !self.open {
            return Err(WriteRejection::new("container is not open"));
        }
        // Footer
        write!(self.writer, "]}}")
            .and_then(|_| self.writer.flush())
            .map_err(|e| WriteRejection::new(e.to_string()))?;
        self.open = false;
        Ok(())
    }
}

/// Écrit une feature en GeoJSON
fn write_feature<W: Write>(
    writer: &mut W,
    id: &ElementId,
    geometry: &Geometry,
    attributes: &FlatAttributes,
) -> Result<()> {
    write!(writer, r#"{{"type":"Feature","id":{},"#, json_id(id))?;

    // Geometry via geozero
    write!(writer, r#""geometry":"#)?;
    let mut geom_buf = Vec::new();
    let mut geom_writer = GeoJsonWriter::new(&mut geom_buf);
    geometry.process_geom(&mut geom_writer)?;
    writer.write_all(&geom_buf)?;

    write!(writer, r#","properties":{{"#)?;
    for (i, (key, value)) in attributes.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write!(writer, r#""{}":{}"#, escape_json(key), json_value(value))?;
    }
    write!(writer, "}}}}")?;

    Ok(())
}

fn json_id(id: &ElementId) -> String {
    match id {
        ElementId::Int(n) => n.to_string(),
        ElementId::Text(s) => format!("\"{}\"", escape_json(s)),
    }
}

fn json_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "null".to_string(),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Real(f) if f.is_finite() => f.to_string(),
        FieldValue::Real(_) => "null".to_string(),
        FieldValue::Text(s) => format!("\"{}\"", escape_json(s)),
    }
}

/// Échappe une chaîne pour JSON
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}
