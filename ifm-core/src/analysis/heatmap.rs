//! Plotly heatmap descriptor of a classified defect table.
//!
//! Only the figure *description* is produced; rendering is left to the
//! notebook frontend.

use ifm_types::DefectCategory;
use serde::Serialize;

pub const HEATMAP_TITLE: &str = "Heatmap of Defect Distribution";
pub const COLORBAR_TITLE: &str = "Defect Type";
pub const COLORSCALE: &str = "Viridis";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapFigure {
    pub data: Vec<HeatmapTrace>,
    pub layout: Layout,
    pub config: FigureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapTrace {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Category label (1..=4) per point.
    pub z: Vec<u8>,
    pub colorscale: &'static str,
    pub colorbar: ColorBar,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorBar {
    pub tickvals: Vec<u8>,
    pub ticktext: Vec<&'static str>,
    pub title: Title,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Title {
    pub text: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Axis {
    pub title: Title,
    pub scaleanchor: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout {
    pub title: Title,
    pub xaxis: Axis,
    pub yaxis: Axis,
    pub autosize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FigureConfig {
    #[serde(rename = "staticPlot")]
    pub static_plot: bool,
}

impl HeatmapFigure {
    /// Build a static heatmap from point coordinates and category labels.
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<u8>) -> Self {
        Self {
            data: vec![HeatmapTrace {
                kind: "heatmap",
                x,
                y,
                z,
                colorscale: COLORSCALE,
                colorbar: ColorBar {
                    tickvals: DefectCategory::ALL.iter().map(|c| c.label()).collect(),
                    ticktext: DefectCategory::ALL.iter().map(|c| c.column_name()).collect(),
                    title: Title {
                        text: COLORBAR_TITLE,
                    },
                },
            }],
            layout: Layout {
                title: Title {
                    text: HEATMAP_TITLE,
                },
                xaxis: Axis {
                    title: Title { text: "X Position" },
                    scaleanchor: "y",
                },
                yaxis: Axis {
                    title: Title { text: "Y Position" },
                    scaleanchor: "x",
                },
                autosize: true,
            },
            config: FigureConfig { static_plot: true },
        }
    }

    /// Plotly JSON form, as stored on analysis entries.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_plotly_shape() {
        let figure = HeatmapFigure::new(vec![0.0, 1.0], vec![0.0, 0.0], vec![1, 4]);
        let json = figure.to_value();

        assert_eq!(json["data"][0]["type"], "heatmap");
        assert_eq!(json["data"][0]["z"], serde_json::json!([1, 4]));
        assert_eq!(json["data"][0]["colorscale"], "Viridis");
        assert_eq!(
            json["data"][0]["colorbar"]["ticktext"],
            serde_json::json!(["Whiskers", "Chipping", "Scratch", "No Error"])
        );
        assert_eq!(json["data"][0]["colorbar"]["title"]["text"], "Defect Type");
        assert_eq!(json["layout"]["title"]["text"], "Heatmap of Defect Distribution");
        assert_eq!(json["layout"]["xaxis"]["scaleanchor"], "y");
        assert_eq!(json["config"]["staticPlot"], true);
    }
}
