use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict};
use welcomecard_core::{CardError, CardPipeline, DetectionMode, OutputFormat, Slot, WelcomeCard};

fn to_py_err(e: CardError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn format_to_string(format: &OutputFormat) -> &'static str {
    match format {
        OutputFormat::Png => "png",
        OutputFormat::Webp => "webp",
    }
}

fn string_to_format(format: &str) -> PyResult<OutputFormat> {
    match format {
        "png" => Ok(OutputFormat::Png),
        "webp" => Ok(OutputFormat::Webp),
        _ => Err(PyValueError::new_err(format!("unknown format: {format}"))),
    }
}

fn card_to_dict<'py>(py: Python<'py>, card: &WelcomeCard) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("data", PyBytes::new(py, &card.data))?;
    dict.set_item("format", format_to_string(&card.format))?;
    dict.set_item("width", card.width)?;
    dict.set_item("height", card.height)?;
    dict.set_item(
        "slot",
        (card.slot.left(), card.slot.top(), card.slot.diameter()),
    )?;
    dict.set_item("placeholder_avatar", card.placeholder_avatar)?;
    Ok(dict)
}

/// Renders welcome cards against one background.
///
/// Keep one renderer alive for the whole process: the decoded background and
/// the detected slot are computed on first use and reused afterwards.
///
/// Args:
///     mode: "auto" (detect the placeholder, default) or "manual"
///     left, top, diameter: manual slot, also the fallback when detection fails
///     format: "png" (default) or "webp"
#[pyclass(frozen)]
struct CardRenderer {
    pipeline: CardPipeline,
}

#[pymethods]
impl CardRenderer {
    #[new]
    #[pyo3(signature = (*, mode="auto", left=620, top=170, diameter=300, format="png"))]
    fn new(mode: &str, left: u32, top: u32, diameter: u32, format: &str) -> PyResult<Self> {
        let mode: DetectionMode = mode.parse().map_err(to_py_err)?;
        let slot = Slot::new(left, top, diameter).map_err(to_py_err)?;
        let pipeline = CardPipeline::new()
            .mode(mode)
            .manual_slot(slot)
            .format(string_to_format(format)?);
        Ok(Self { pipeline })
    }

    /// Build a renderer from CIRCLE_MODE and MANUAL_CIRCLE_{LEFT,TOP,DIAMETER}.
    #[staticmethod]
    fn from_env() -> PyResult<Self> {
        let pipeline = CardPipeline::from_env().map_err(to_py_err)?;
        Ok(Self { pipeline })
    }

    /// Render a card.
    ///
    /// Args:
    ///     background: Raw background image bytes; decoded on the first call only
    ///     avatar: Raw avatar bytes, or None for a gray placeholder
    ///
    /// Returns:
    ///     dict with keys: data (bytes), format (str), width (int), height (int),
    ///                     slot (tuple), placeholder_avatar (bool)
    #[pyo3(signature = (background, avatar=None))]
    fn render<'py>(
        &self,
        py: Python<'py>,
        background: Vec<u8>,
        avatar: Option<Vec<u8>>,
    ) -> PyResult<Bound<'py, PyDict>> {
        let card = py
            .allow_threads(|| {
                self.pipeline
                    .produce_card_from_bytes(&background, avatar.as_deref())
            })
            .map_err(to_py_err)?;
        card_to_dict(py, &card)
    }

    /// Resolve the avatar slot for a background as (left, top, diameter).
    fn slot(&self, py: Python<'_>, background: Vec<u8>) -> PyResult<(u32, u32, u32)> {
        let slot = py
            .allow_threads(|| {
                let decoded = self.pipeline.background(|| Some(background))?;
                Ok::<_, CardError>(self.pipeline.slot(decoded))
            })
            .map_err(to_py_err)?;
        Ok((slot.left(), slot.top(), slot.diameter()))
    }
}

#[pymodule]
fn welcomecard(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<CardRenderer>()?;
    Ok(())
}
