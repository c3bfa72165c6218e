use console::Style;
use aopipe_core::pipeline::{NightSummary, ReductionConfig};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_night_config(config: &ReductionConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("AO Night Reduction"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(18)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Raw"),
        s.path.apply_to(config.raw_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Reduced"),
        s.path.apply_to(config.reduced_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Log"),
        s.path.apply_to(config.obs_log.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Instrument"),
        s.method.apply_to(config.instrument)
    );
    match config.bad_pixel_mask {
        Some(ref mask) => println!(
            "  {:<14}{}",
            s.label.apply_to("Mask"),
            s.path.apply_to(mask.display())
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Mask"),
            s.disabled.apply_to("none")
        ),
    }
    println!();

    println!("  {}", s.header.apply_to("Registration"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Search"),
        s.value.apply_to(format!("{} px", config.registration.search_radius))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Upsample"),
        s.value.apply_to(format!("{}x", config.registration.upsample))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Shifts"),
        s.method.apply_to(format!("{:?}", config.registration.interpolation).to_lowercase())
    );
    if !config.rough_centers.is_empty() {
        for (target, center) in &config.rough_centers {
            println!(
                "    {:<12}{} {}",
                s.label.apply_to("Rough"),
                s.value.apply_to(target),
                s.label.apply_to(format!("({:.1}, {:.1})", center.row, center.col))
            );
        }
    }
    println!();

    println!("  {}", s.header.apply_to("Stacking"));
    match config.stacking.final_size {
        Some(size) => println!(
            "    {:<12}{}",
            s.label.apply_to("Final size"),
            s.value.apply_to(format!("{size} px"))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Final size"),
            s.disabled.apply_to("full frame")
        ),
    }
    println!();

    if config.contrast.enabled {
        println!("  {}", s.header.apply_to("Contrast"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Sectors"),
            s.value.apply_to(config.contrast.sector_count)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Out to"),
            s.value.apply_to(format!("{}\"", config.contrast.max_separation_arcsec))
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Contrast"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();
}

pub fn print_night_results(summary: &NightSummary) {
    let s = Styles::new();

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Calibration"),
        s.value.apply_to(format!(
            "{} darks, {} flats, {} skies",
            summary.darks.len(),
            summary.flats.len(),
            summary.skies.len()
        ))
    );
    println!();

    if summary.targets.is_empty() {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Targets"),
            s.disabled.apply_to("none")
        );
        return;
    }

    println!("  {}", s.header.apply_to("Targets"));
    for target in &summary.targets {
        println!(
            "    {} {}",
            s.value.apply_to(&target.target),
            s.method.apply_to(&target.filter)
        );
        let mut detail = format!(
            "{} frames, FWHM {:.1} px, {}",
            target.frames, target.fwhm, target.method
        );
        if target.fallbacks > 0 {
            detail.push_str(&format!(", {} fallbacks", target.fallbacks));
        }
        println!("      {}", s.label.apply_to(detail));
        if let Some(ref curve) = target.contrast {
            if let Some(last) = curve.points.iter().rev().find(|p| p.delta_mag.is_finite()) {
                println!(
                    "      {}",
                    s.label.apply_to(format!(
                        "{:.2} mag at {:.2}\"",
                        last.delta_mag, last.separation
                    ))
                );
            }
        }
        println!("      {}", s.path.apply_to(target.output_dir.display()));
    }
    println!();
}
