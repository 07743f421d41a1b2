//! The GeoConvert conversion wizard, one step at a time.
//!
//! Every step re-parses the form of the page the previous step returned,
//! builds a payload from it, and posts to the form's action. Only the latest
//! page is kept. Steps must run in order and none are retried.

use std::path::Path;

use serde::Serialize;

use crate::collector::{DownloadedFile, ResultCollector};
use crate::config::WizardConfig;
use crate::dom::Snapshot;
use crate::error::{GeoconvertError, GeoconvertResult};
use crate::form::ParsedForm;
use crate::payload::{Payload, Selections};
use crate::session::{Session, Upload};

/// Last completed stage of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    /// Landing page fetched, session cookie issued.
    Start,
    /// Conversion function chosen.
    Credentials,
    SourceGeography,
    TargetGeography,
    LookupTableSelected,
    ReadyToUpload,
    FileUploaded,
    /// Intermediate confirmation page passed; results page is current.
    ExtraStepComplete,
    /// Result files downloaded.
    Done,
}

impl WizardStep {
    pub fn next(self) -> Option<Self> {
        use WizardStep::*;
        match self {
            Start => Some(Credentials),
            Credentials => Some(SourceGeography),
            SourceGeography => Some(TargetGeography),
            TargetGeography => Some(LookupTableSelected),
            LookupTableSelected => Some(ReadyToUpload),
            ReadyToUpload => Some(FileUploaded),
            FileUploaded => Some(ExtraStepComplete),
            ExtraStepComplete => Some(Done),
            Done => None,
        }
    }
}

/// Drives one conversion job through the wizard.
pub struct SessionWalker {
    config: WizardConfig,
    session: Session,
    snapshot: Snapshot,
    state: WizardStep,
    uploaded_name: Option<String>,
}

impl SessionWalker {
    /// Start a session and fetch the landing page.
    pub async fn open(config: WizardConfig) -> GeoconvertResult<Self> {
        let session = Session::new(&config.base_url, config.timeout_ms)?;
        let page = session.get(&config.start_page).await?;
        let snapshot = Snapshot::parse(page.url, &page.body);

        match session.cookie("CFTOKEN") {
            Some(token) => tracing::info!("Session started (token {token})"),
            None => tracing::warn!("Session started without a CFTOKEN cookie"),
        }

        Ok(Self {
            config,
            session,
            snapshot,
            state: WizardStep::Start,
            uploaded_name: None,
        })
    }

    /// Run the whole walk for `file` and download the results.
    pub async fn run(config: WizardConfig, file: &Path) -> GeoconvertResult<Vec<DownloadedFile>> {
        let mut walker = Self::open(config).await?;
        walker.step1().await?;
        walker.step2().await?;
        walker.step3().await?;
        walker.step4().await?;
        walker.step5().await?;
        walker.step6(file).await?;
        walker.step7().await?;
        walker.collect().await
    }

    pub fn state(&self) -> WizardStep {
        self.state
    }

    /// The page the next step will read.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Choose the conversion function.
    pub async fn step1(&mut self) -> GeoconvertResult<()> {
        let selections = self.config.steps.function.clone();
        self.advance(WizardStep::Start, &selections, None).await?;
        tracing::info!("Conversion specified");
        Ok(())
    }

    /// Choose the source geography.
    pub async fn step2(&mut self) -> GeoconvertResult<()> {
        let selections = self.config.steps.source.clone();
        self.advance(WizardStep::Credentials, &selections, None).await?;
        tracing::info!("Source geography specified");
        Ok(())
    }

    /// Choose the target geography.
    pub async fn step3(&mut self) -> GeoconvertResult<()> {
        let selections = self.config.steps.target.clone();
        self.advance(WizardStep::SourceGeography, &selections, None).await?;
        tracing::info!("Target geography specified");
        Ok(())
    }

    /// Choose the lookup table.
    pub async fn step4(&mut self) -> GeoconvertResult<()> {
        let selections = self.config.steps.lookup.clone();
        self.advance(WizardStep::TargetGeography, &selections, None).await?;
        tracing::info!("Lookup table specified");
        Ok(())
    }

    /// Accept the defaults and move to the upload form.
    pub async fn step5(&mut self) -> GeoconvertResult<()> {
        self.advance(WizardStep::LookupTableSelected, &Selections::new(), None).await?;
        tracing::info!("Ready to submit data");
        Ok(())
    }

    /// Upload the file to convert.
    pub async fn step6(&mut self, file: &Path) -> GeoconvertResult<()> {
        self.require_state(WizardStep::ReadyToUpload)?;

        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .map(String::from)
            .ok_or_else(|| GeoconvertError::InvalidUpload(file.display().to_string()))?;
        let upload = Upload {
            field: self.config.upload_field.clone(),
            file_name: file_name.clone(),
            bytes: tokio::fs::read(file).await?,
        };

        let selections = self.config.steps.upload.clone();
        self.advance(WizardStep::ReadyToUpload, &selections, Some(&upload)).await?;
        tracing::info!("File '{file_name}' uploaded for conversion");
        self.uploaded_name = Some(file_name);
        Ok(())
    }

    /// Pass the confirmation page that sits in front of the results.
    pub async fn step7(&mut self) -> GeoconvertResult<()> {
        self.advance(WizardStep::FileUploaded, &Selections::new(), None).await?;
        tracing::info!("Confirmation step complete");
        Ok(())
    }

    /// Download every result linked from the current page.
    pub async fn collect(&mut self) -> GeoconvertResult<Vec<DownloadedFile>> {
        self.require_state(WizardStep::ExtraStepComplete)?;
        let uploaded = self
            .uploaded_name
            .clone()
            .ok_or_else(|| GeoconvertError::InvalidUpload("no file uploaded".to_string()))?;

        let collector = ResultCollector::new(
            &self.session,
            &self.config.output_dir,
            &self.config.result_link_class,
        );
        let files = collector.collect(&self.snapshot, &uploaded).await?;

        self.state = WizardStep::Done;
        Ok(files)
    }

    fn require_state(&self, expected: WizardStep) -> GeoconvertResult<()> {
        if self.state != expected {
            return Err(GeoconvertError::OutOfOrder {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Parse the current form, post it with `selections`, and make the
    /// response the current page.
    async fn advance(
        &mut self,
        expected: WizardStep,
        selections: &Selections,
        upload: Option<&Upload>,
    ) -> GeoconvertResult<()> {
        self.require_state(expected)?;

        let form = ParsedForm::from_snapshot(&self.snapshot)?;
        let payload = Payload::build(&form, selections)?;
        tracing::debug!(action = %form.action, ?payload, "submitting step");

        let fields = payload.to_fields();
        let page = match upload {
            Some(upload) => {
                self.session
                    .post_multipart(&form.action, &fields, upload)
                    .await?
            }
            None => self.session.post_form(&form.action, &fields).await?,
        };

        self.snapshot = Snapshot::parse(page.url, &page.body);
        self.state = expected.next().unwrap_or(WizardStep::Done);
        Ok(())
    }
}
