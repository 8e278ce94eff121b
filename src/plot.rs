//! Audit plots of the histograms stored next to a correction chain.

use plotters::prelude::*;
use std::path::Path;

use crate::correction::Correction;
use crate::error::{Error, Result};
use crate::histo::Histo1D;
use crate::store::{audit_key, WeightStore};

fn plot_err<E: std::fmt::Display>(e: E) -> Error {
    Error::Plot(e.to_string())
}

/// Outline of a histogram as a polyline.
fn steps(h: &Histo1D) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(2 * h.len());
    for i in 0..h.len() {
        let v = h.bin(i).value();
        points.push((h.edges()[i], v));
        points.push((h.edges()[i + 1], v));
    }
    points
}

fn y_range<'a>(hs: impl IntoIterator<Item = &'a Histo1D>, pad: f64) -> (f64, f64) {
    let (lo, hi) = hs
        .into_iter()
        .flat_map(|h| h.bins().iter().map(|b| (b.value() - b.error(), b.value() + b.error())))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (a, b)| (lo.min(a), hi.max(b)));
    if !lo.is_finite() || !hi.is_finite() || lo >= hi {
        return (0.0, 1.0);
    }
    let margin = pad * (hi - lo);
    (lo - margin, hi + margin)
}

/// The latest audit entry at `address`: data and MC densities and the raw correction.
pub fn latest_audit(store: &WeightStore, address: &str) -> Result<Option<[Histo1D; 3]>> {
    let entries = store.get(&audit_key(address))?;
    if entries.len() < 5 {
        return Ok(None);
    }
    let last = &entries[entries.len() - 5..];
    match (&last[2], &last[3], &last[4]) {
        (Correction::H1(d), Correction::H1(m), Correction::H1(w)) => Ok(Some([d.clone(), m.clone(), w.clone()])),
        _ => Err(Error::Config(format!("unexpected audit entries for `{address}`"))),
    }
}

/// Draw the data/MC densities and the correction for `address` as SVG.
pub fn plot_audit(store: &WeightStore, address: &str, output: impl AsRef<Path>) -> Result<()> {
    let Some([data, mc, ratio]) = latest_audit(store, address)? else {
        return Err(Error::Config(format!("no audit histograms stored for `{address}`")));
    };
    let (x_lo, x_hi) = data.range();

    let root = SVGBackend::new(output.as_ref(), (900, 700)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let (upper, lower) = root.split_vertically(450);

    let (y_lo, y_hi) = y_range([&data, &mc], 0.1);
    let mut chart = ChartBuilder::on(&upper)
        .caption(format!("{address}: densities"), ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(x_lo..x_hi, y_lo.min(0.0)..y_hi)
        .map_err(plot_err)?;
    chart.configure_mesh().draw().map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(steps(&mc), &RED))
        .map_err(plot_err)?
        .label("mc")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));
    chart
        .draw_series((0..data.len()).map(|i| {
            let b = data.bin(i);
            ErrorBar::new_vertical(data.center(i), b.value() - b.error(), b.value(), b.value() + b.error(), BLACK.filled(), 6)
        }))
        .map_err(plot_err)?
        .label("data")
        .legend(|(x, y)| Circle::new((x + 10, y), 3, BLACK.filled()));
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    let (r_lo, r_hi) = y_range([&ratio], 0.1);
    let (rx_lo, rx_hi) = ratio.range();
    let mut chart = ChartBuilder::on(&lower)
        .caption("correction", ("sans-serif", 16))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(60)
        .build_cartesian_2d(rx_lo..rx_hi, r_lo..r_hi)
        .map_err(plot_err)?;
    chart.configure_mesh().draw().map_err(plot_err)?;
    chart.draw_series(LineSeries::new(steps(&ratio), &BLUE)).map_err(plot_err)?;
    chart
        .draw_series(LineSeries::new(vec![(rx_lo, 1.0), (rx_hi, 1.0)], BLACK.mix(0.5)))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    tracing::info!(address, output = %output.as_ref().display(), "audit plot written");
    Ok(())
}
