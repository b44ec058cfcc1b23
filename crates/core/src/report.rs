use crate::models::{
    ExtractedSection, OutlineDocument, OutlineEntry, OutlineItem, RankedChunk, RunInput,
    RunMetadata, RunOutput, SubsectionAnalysis,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

pub fn build_run_output(
    input: &RunInput,
    ranked: &[RankedChunk],
    timestamp: DateTime<Utc>,
) -> RunOutput {
    let metadata = RunMetadata {
        input_documents: input.filenames(),
        persona: input.persona.role.clone(),
        job_to_be_done: input.task().to_string(),
        processing_timestamp: timestamp.to_rfc3339(),
    };

    let extracted_sections = ranked
        .iter()
        .map(|item| ExtractedSection {
            document: item.chunk.document.clone(),
            section_title: item.chunk.title.clone(),
            importance_rank: item.rank,
            page_number: item.chunk.page,
        })
        .collect();

    let subsection_analysis = ranked
        .iter()
        .map(|item| SubsectionAnalysis {
            document: item.chunk.document.clone(),
            refined_text: item.chunk.text.clone(),
            page_number: item.chunk.page,
        })
        .collect();

    RunOutput {
        metadata,
        extracted_sections,
        subsection_analysis,
    }
}

pub fn build_outline_document(title: String, outline: &[OutlineEntry]) -> OutlineDocument {
    OutlineDocument {
        title,
        outline: outline
            .iter()
            .map(|entry| OutlineItem {
                level: format!("H{}", entry.level),
                text: entry.title.clone(),
                page: entry.page,
            })
            .collect(),
    }
}

/// Pretty-prints `value` as UTF-8 JSON with `indent` spaces per level.
pub fn write_json<W: Write, T: Serialize>(
    writer: W,
    value: &T,
    indent: usize,
) -> Result<(), serde_json::Error> {
    let indent = " ".repeat(indent);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
    let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
    value.serialize(&mut serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, DocumentRef, JobToBeDone, Persona};
    use chrono::TimeZone;

    fn input(filenames: &[&str]) -> RunInput {
        RunInput {
            challenge_info: None,
            persona: Persona {
                role: "Analyst".to_string(),
            },
            job_to_be_done: JobToBeDone {
                task: "find revenue figures".to_string(),
            },
            documents: filenames
                .iter()
                .map(|filename| DocumentRef {
                    filename: filename.to_string(),
                    title: None,
                })
                .collect(),
        }
    }

    fn ranked(title: &str, document: &str, page: u32, rank: usize) -> RankedChunk {
        RankedChunk {
            chunk: Chunk {
                chunk_id: format!("{document}-{page}"),
                title: title.to_string(),
                text: format!("{title} body"),
                page,
                page_end: page,
                document: document.to_string(),
                score: Some(1.0 / rank as f32),
            },
            rank,
        }
    }

    #[test]
    fn run_output_sections_are_index_aligned() {
        let timestamp = Utc.with_ymd_and_hms(2025, 7, 1, 12, 30, 0).unwrap();
        let items = vec![
            ranked("Financials", "report.pdf", 3, 1),
            ranked("Intro", "report.pdf", 1, 2),
        ];

        let output = build_run_output(&input(&["report.pdf"]), &items, timestamp);

        assert_eq!(output.extracted_sections.len(), 2);
        assert_eq!(output.subsection_analysis.len(), 2);
        for (section, analysis) in output
            .extracted_sections
            .iter()
            .zip(&output.subsection_analysis)
        {
            assert_eq!(section.document, analysis.document);
            assert_eq!(section.page_number, analysis.page_number);
        }
        assert_eq!(
            output
                .extracted_sections
                .iter()
                .map(|section| section.importance_rank)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(output.subsection_analysis[0].refined_text, "Financials body");
        assert_eq!(output.metadata.persona, "Analyst");
        assert_eq!(output.metadata.job_to_be_done, "find revenue figures");
        assert_eq!(
            output.metadata.processing_timestamp,
            "2025-07-01T12:30:00+00:00"
        );
    }

    #[test]
    fn serialized_output_keeps_document_order() -> Result<(), Box<dyn std::error::Error>> {
        let documents = ["b.pdf", "a.pdf", "c.pdf"];
        let output = build_run_output(&input(&documents), &[], Utc::now());

        let mut buffer = Vec::new();
        write_json(&mut buffer, &output, 4)?;
        let parsed: serde_json::Value = serde_json::from_slice(&buffer)?;

        assert_eq!(
            parsed["metadata"]["input_documents"],
            serde_json::json!(["b.pdf", "a.pdf", "c.pdf"])
        );
        assert_eq!(parsed["extracted_sections"], serde_json::json!([]));
        assert!(String::from_utf8(buffer)?.contains("\n    \"metadata\""));
        Ok(())
    }

    #[test]
    fn outline_levels_render_as_headings() {
        let outline = vec![
            OutlineEntry::new(1, "Introduction", 1),
            OutlineEntry::new(2, "Background", 2),
            OutlineEntry::new(3, "Prior work", 2),
        ];

        let document = build_outline_document("Survey".to_string(), &outline);

        assert_eq!(document.title, "Survey");
        assert_eq!(
            document
                .outline
                .iter()
                .map(|item| item.level.as_str())
                .collect::<Vec<_>>(),
            vec!["H1", "H2", "H3"]
        );
        assert_eq!(document.outline[2].text, "Prior work");
        assert_eq!(document.outline[2].page, 2);
    }

    #[test]
    fn non_ascii_text_is_written_unescaped() -> Result<(), Box<dyn std::error::Error>> {
        let document = build_outline_document(
            "Études".to_string(),
            &[OutlineEntry::new(1, "Résumé", 1)],
        );

        let mut buffer = Vec::new();
        write_json(&mut buffer, &document, 2)?;
        let written = String::from_utf8(buffer)?;

        assert!(written.contains("\"Études\""));
        assert!(written.contains("\n  \"title\""));
        Ok(())
    }
}
