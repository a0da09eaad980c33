use std::path::Path;

use log::warn;

use crate::{
    printer::PrinterDescriptor,
    process::{args, CommandRunner},
};

use super::TestImage;

/// 4x6 inches at 300 DPI, landscape.
const SIZE: &str = "1800x1200";

struct Pattern {
    file: &'static str,
    description: &'static str,
    args: fn(&PrinterDescriptor) -> Vec<String>,
}

static PATTERNS: [Pattern; 5] = [
    Pattern {
        file: "test_card.png",
        description: "4x6 test card",
        args: |printer| {
            let label = format!("PRig\n{}", printer.model);
            args([
                "-size", SIZE, "xc:blue",
                "-fill", "white",
                "-pointsize", "96",
                "-gravity", "center",
                "-annotate", "0", label.as_str(),
            ])
        },
    },
    Pattern {
        file: "color_bars.png",
        description: "Color bars",
        args: |_| {
            args([
                "-size", "225x1200",
                "xc:white", "xc:yellow", "xc:cyan", "xc:lime", "xc:magenta", "xc:red", "xc:blue", "xc:black",
                "+append",
            ])
        },
    },
    Pattern {
        file: "color_gradient.png",
        description: "Color gradient",
        args: |_| args(["-size", SIZE, "gradient:red-blue"]),
    },
    Pattern {
        file: "grayscale_gradient.png",
        description: "Grayscale gradient",
        args: |_| args(["-size", SIZE, "gradient:white-black"]),
    },
    Pattern {
        file: "checkerboard.png",
        description: "Fine detail checkerboard",
        args: |_| args(["-size", SIZE, "tile:pattern:checkerboard"]),
    },
];

/// Renders every pattern with ImageMagick into `dir`. Patterns that fail to render are skipped.
pub fn render_patterns(runner: &dyn CommandRunner, dir: &Path, printer: &PrinterDescriptor) -> Vec<TestImage> {
    PATTERNS
        .iter()
        .filter_map(|pattern| {
            let path = dir.join(pattern.file);
            let mut arguments = (pattern.args)(printer);
            arguments.push(path.to_string_lossy().into_owned());

            match runner.run("convert", &arguments) {
                Ok(output) if output.success() && path.exists() => Some(TestImage { path, description: pattern.description.to_owned() }),
                Ok(output) => {
                    warn!("ImageMagick could not render {}: {}", pattern.file, output.stderr.trim());
                    None
                }
                Err(e) => {
                    warn!("ImageMagick is not available: {e}");
                    None
                }
            }
        })
        .collect()
}
