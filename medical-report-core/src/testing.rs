//! Fakes shared by the unit tests of this crate.

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document as PdfDocument, Object, Stream, StringFormat, dictionary};
use rig::completion::CompletionError;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ExtractionError, ModelError};
use crate::extraction::ContentExtractor;
use crate::llm::{Completion, CompletionModel, CompletionRequest};
use crate::models::DocumentLocation;
use crate::source::SourceFetcher;

/// Builds a PDF whose pages each show the given text runs, one line per run.
pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
    let pages: Vec<Vec<Vec<u8>>> = pages
        .iter()
        .map(|runs| runs.iter().map(|run| run.as_bytes().to_vec()).collect())
        .collect();
    build_pdf(&pages)
}

/// One-page PDF showing raw WinAnsi-encoded bytes.
pub fn pdf_with_win_ansi_text(bytes: &[u8]) -> Vec<u8> {
    build_pdf(&[vec![bytes.to_vec()]])
}

fn build_pdf(pages: &[Vec<Vec<u8>>]) -> Vec<u8> {
    let mut pdf = PdfDocument::with_version("1.5");
    let pages_id = pdf.new_object_id();
    let font_id = pdf.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids = Vec::new();
    for runs in pages {
        let mut operations = Vec::new();
        let mut y = 720;
        for run in runs {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
            operations.push(Operation::new("Td", vec![72.into(), y.into()]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::String(run.clone(), StringFormat::Literal)],
            ));
            operations.push(Operation::new("ET", vec![]));
            y -= 14;
        }

        let content = Content { operations };
        let content_id = pdf.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = pdf.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    pdf.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = pdf.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    pdf.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    pdf.save_to(&mut buffer).expect("pdf saves");
    buffer
}

/// Serves the same bytes for every URL and counts requests.
pub struct StaticFetcher {
    bytes: Vec<u8>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.bytes.clone())
    }
}

/// Extractor returning a fixed outcome and counting invocations.
pub struct FakeExtractor {
    outcome: Result<String, String>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn returning(text: &str) -> Self {
        Self {
            outcome: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for FakeExtractor {
    async fn extract(&self, _location: &DocumentLocation) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcome
            .clone()
            .map_err(ExtractionError::PdfParsing)
    }
}

/// Completion model that records every request and answers from a script.
pub struct ScriptedModel {
    reply: Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("request log").clone()
    }
}

#[async_trait]
impl CompletionModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ModelError> {
        self.requests.lock().expect("request log").push(request);
        match &self.reply {
            Ok(text) => Ok(Completion { text: text.clone() }),
            Err(message) => Err(ModelError::Completion(CompletionError::ProviderError(
                message.clone(),
            ))),
        }
    }
}
