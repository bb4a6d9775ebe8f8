use crate::services::compressor::file_label;
use crate::services::error::{ConvertError, ConvertResult};
use crate::services::process::{ToolCommand, ensure_output, run_tool};
use crate::utils::validation::extension_of;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Document types LibreOffice is asked to turn into PDF.
pub const OFFICE_INPUT_EXTENSIONS: &[&str] = &[
    "doc", "docx", "odt", "rtf", "txt", "ppt", "pptx", "odp", "xls", "xlsx", "ods", "csv",
];

/// Characters escaped in the `file://` URL of the LibreOffice profile directory.
const PROFILE_URL_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Target formats accepted by the PDF to office conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeFormat {
    Docx,
    Doc,
    Odt,
    Rtf,
    Txt,
    Html,
    Pptx,
    Odp,
}

impl OfficeFormat {
    pub const ALL: [OfficeFormat; 8] = [
        OfficeFormat::Docx,
        OfficeFormat::Doc,
        OfficeFormat::Odt,
        OfficeFormat::Rtf,
        OfficeFormat::Txt,
        OfficeFormat::Html,
        OfficeFormat::Pptx,
        OfficeFormat::Odp,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            OfficeFormat::Docx => "docx",
            OfficeFormat::Doc => "doc",
            OfficeFormat::Odt => "odt",
            OfficeFormat::Rtf => "rtf",
            OfficeFormat::Txt => "txt",
            OfficeFormat::Html => "html",
            OfficeFormat::Pptx => "pptx",
            OfficeFormat::Odp => "odp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OfficeFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OfficeFormat::Doc => "application/msword",
            OfficeFormat::Odt => "application/vnd.oasis.opendocument.text",
            OfficeFormat::Rtf => "application/rtf",
            OfficeFormat::Txt => "text/plain; charset=utf-8",
            OfficeFormat::Html => "text/html; charset=utf-8",
            OfficeFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
            OfficeFormat::Odp => "application/vnd.oasis.opendocument.presentation",
        }
    }

    /// PDF import filter that opens the source in the matching application.
    pub fn import_filter(&self) -> &'static str {
        match self {
            OfficeFormat::Pptx | OfficeFormat::Odp => "impress_pdf_import",
            _ => "writer_pdf_import",
        }
    }

    /// Value for `--convert-to`.
    fn convert_target(&self) -> &'static str {
        match self {
            OfficeFormat::Txt => "txt:Text",
            other => other.extension(),
        }
    }
}

impl fmt::Display for OfficeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OfficeFormat {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('.').to_lowercase();
        OfficeFormat::ALL
            .into_iter()
            .find(|format| format.extension() == normalized)
            .ok_or_else(|| {
                let allowed: Vec<&str> = OfficeFormat::ALL.iter().map(|f| f.extension()).collect();
                ConvertError::UnsupportedFormat(format!(
                    "'{}' is not a supported target format (expected one of: {})",
                    s.trim(),
                    allowed.join(", ")
                ))
            })
    }
}

#[derive(Debug, Clone)]
pub struct OfficeOptions {
    pub program: String,
    pub timeout: Duration,
}

/// Converts an office document to PDF. Returns the produced file.
pub async fn office_to_pdf(
    input: &Path,
    original_name: &str,
    out_dir: &Path,
    profile_dir: &Path,
    options: &OfficeOptions,
) -> ConvertResult<PathBuf> {
    let extension = extension_of(original_name).unwrap_or_default();
    if !OFFICE_INPUT_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ConvertError::UnsupportedFormat(format!(
            "'{}' is not a supported office document",
            original_name
        )));
    }

    let command = soffice(options, profile_dir)
        .await?
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(out_dir)
        .arg(input);
    run_tool(&command, options.timeout).await?;

    let produced = expected_output(input, out_dir, "pdf");
    ensure_output(&produced).await?;
    info!("📝 Converted {} to PDF", original_name);
    Ok(produced)
}

/// Converts a PDF into an allow-listed office format. Returns the produced file.
pub async fn pdf_to_office(
    input: &Path,
    format: OfficeFormat,
    out_dir: &Path,
    profile_dir: &Path,
    options: &OfficeOptions,
) -> ConvertResult<PathBuf> {
    let command = soffice(options, profile_dir)
        .await?
        .arg(format!("--infilter={}", format.import_filter()))
        .arg("--convert-to")
        .arg(format.convert_target())
        .arg("--outdir")
        .arg(out_dir)
        .arg(input);
    run_tool(&command, options.timeout).await?;

    let produced = expected_output(input, out_dir, format.extension());
    ensure_output(&produced).await?;
    info!("📝 Converted {} to {}", file_label(input), format);
    Ok(produced)
}

/// Headless LibreOffice with a private user profile, so concurrent
/// conversions never share (and lock) one profile directory.
async fn soffice(options: &OfficeOptions, profile_dir: &Path) -> ConvertResult<ToolCommand> {
    tokio::fs::create_dir_all(profile_dir)
        .await
        .map_err(|e| ConvertError::io(profile_dir, e))?;
    let absolute = tokio::fs::canonicalize(profile_dir)
        .await
        .map_err(|e| ConvertError::io(profile_dir, e))?;

    Ok(ToolCommand::new(&options.program)
        .arg("--headless")
        .arg("--norestore")
        .arg(format!("-env:UserInstallation={}", profile_url(&absolute))))
}

fn profile_url(path: &Path) -> String {
    let path = path.to_string_lossy();
    format!("file://{}", utf8_percent_encode(&path, PROFILE_URL_SET))
}

/// LibreOffice names its output `<input stem>.<ext>` inside the out dir.
fn expected_output(input: &Path, out_dir: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string());
    out_dir.join(format!("{}.{}", stem, extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use crate::services::process::tests::fake_tool;

    #[test]
    fn test_format_allow_list() {
        assert_eq!("docx".parse::<OfficeFormat>().unwrap(), OfficeFormat::Docx);
        assert_eq!(" .PPTX ".parse::<OfficeFormat>().unwrap(), OfficeFormat::Pptx);
        assert_eq!("txt".parse::<OfficeFormat>().unwrap(), OfficeFormat::Txt);

        for rejected in ["exe", "pdf; rm -rf /", "", "docx --outdir /etc", "xlsx"] {
            let err = rejected.parse::<OfficeFormat>().unwrap_err();
            assert!(matches!(err, ConvertError::UnsupportedFormat(_)), "{}", rejected);
        }
    }

    #[test]
    fn test_import_filters() {
        assert_eq!(OfficeFormat::Docx.import_filter(), "writer_pdf_import");
        assert_eq!(OfficeFormat::Odp.import_filter(), "impress_pdf_import");
        assert_eq!(OfficeFormat::Txt.convert_target(), "txt:Text");
        assert_eq!(OfficeFormat::Rtf.convert_target(), "rtf");
    }

    #[test]
    fn test_expected_output_and_profile_url() {
        let produced = expected_output(Path::new("/w/abc_report.docx"), Path::new("/w/out"), "pdf");
        assert_eq!(produced, PathBuf::from("/w/out/abc_report.pdf"));
        assert_eq!(
            profile_url(Path::new("/tmp/my job/lo")),
            "file:///tmp/my%20job/lo"
        );
    }

    #[tokio::test]
    async fn test_unknown_document_type_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let options = OfficeOptions {
            program: "definitely-not-libreoffice".to_string(),
            timeout: Duration::from_secs(5),
        };
        let err = office_to_pdf(
            &dir.path().join("x_payload.exe"),
            "payload.exe",
            dir.path(),
            &dir.path().join("profile"),
            &options,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(_)));
    }

    #[cfg(unix)]
    fn fake_soffice(dir: &Path, produce: bool) -> String {
        let body = if produce {
            r#"ext="${fmt%%:*}"
stem=$(basename "$last")
stem="${stem%.*}"
printf converted > "$outdir/$stem.$ext""#
        } else {
            "true"
        };
        let script = format!(
            r#"outdir=""
fmt=""
last=""
while [ $# -gt 0 ]; do
  case "$1" in
    --outdir) outdir="$2"; shift ;;
    --convert-to) fmt="$2"; shift ;;
    *) last="$1" ;;
  esac
  shift
done
{}"#,
            body
        );
        fake_tool(dir, if produce { "soffice-ok" } else { "soffice-silent" }, &script)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_located_by_input_stem() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("1234_letter.docx");
        std::fs::write(&input, b"doc").unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();
        let options = OfficeOptions {
            program: fake_soffice(dir.path(), true),
            timeout: Duration::from_secs(10),
        };

        let produced = office_to_pdf(&input, "letter.docx", &out_dir, &dir.path().join("p"), &options)
            .await
            .unwrap();
        assert_eq!(produced, out_dir.join("1234_letter.pdf"));

        let pdf = dir.path().join("5678_scan.pdf");
        std::fs::write(&pdf, b"%PDF").unwrap();
        let produced = pdf_to_office(&pdf, OfficeFormat::Txt, &out_dir, &dir.path().join("p"), &options)
            .await
            .unwrap();
        assert_eq!(produced, out_dir.join("5678_scan.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_zero_exit_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("1234_slides.pptx");
        std::fs::write(&input, b"ppt").unwrap();
        let options = OfficeOptions {
            program: fake_soffice(dir.path(), false),
            timeout: Duration::from_secs(10),
        };

        let err = office_to_pdf(&input, "slides.pptx", dir.path(), &dir.path().join("p"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Conversion(ref m) if m.contains("not produced")));
    }
}
