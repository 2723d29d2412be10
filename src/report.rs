use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::sampler::RunReport;
use crate::stats::Snapshot;

const RULE: &str = "--------------------------";

/// Prints the report to stdout and, when asked, saves it to a file.
pub fn write_report(report: &RunReport, output_file: Option<&Path>) -> io::Result<()> {
    {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        format_console(report, &mut out)?;
        out.flush()?;
    }

    if let Some(path) = output_file {
        let f = File::create(path)?;
        let mut out = BufWriter::new(f);
        format_file(report, &mut out)?;
        out.flush()?;
        log::info!("report saved to {}", path.display());
    }
    Ok(())
}

/// Mimics C's `%g`: six significant digits, trailing zeros removed,
/// scientific notation outside `[1e-4, 1e6)`.
pub fn format_g(v: f64) -> String {
    if v == 0.0 || !v.is_finite() {
        return format!("{}", v);
    }
    let sci = format!("{:.5e}", v);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (5 - exp) as usize;
        trim_zeros(&format!("{:.*}", decimals, v)).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

fn stat_lines(s: &Snapshot, prefix: &str, unit: &str, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "{}\tmin:\t\t{:.6}{}", prefix, s.min, unit)?;
    writeln!(out, "{}\tmax:\t\t{:.6}{}", prefix, s.max, unit)?;
    writeln!(out, "{}\tmean:\t\t{:.6}{}", prefix, s.mean, unit)?;
    writeln!(out, "{}\tsum:\t\t{:.6}{}", prefix, s.sum, unit)?;
    writeln!(out, "{}\tvariance:\t{}{}", prefix, format_g(s.variance), unit)?;
    writeln!(out, "{}\tstd dev:\t{:.6}{}", prefix, s.std_dev, unit)?;
    Ok(())
}

fn format_console(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    let unit = report.unit.suffix();

    writeln!(
        out,
        "# CPU frequency ({}): {:.2} MHz",
        report.calibration.strategy.label(),
        report.calibration.mhz()
    )?;
    match report.duration {
        Some(d) => writeln!(
            out,
            "{} cycles done in {} {}.",
            report.measured(),
            format_g(d),
            unit
        )?,
        None => writeln!(
            out,
            "{} cycles done over {}.",
            report.measured(),
            report.loops.saturating_sub(report.warmup)
        )?,
    }
    match &report.statistics {
        Some(s) => {
            writeln!(out, "Cycles duration:")?;
            stat_lines(s, "", &format!(" {}", unit), out)?;
        }
        None => writeln!(out, "Cycles duration: no data")?,
    }

    writeln!(out, "{}", RULE)?;
    writeln!(out, "duration ({})\tnb. cycles", unit)?;
    writeln!(out, "{}", RULE)?;
    for (bucket, count) in report.histogram.iter() {
        writeln!(out, "{}\t\t{}", bucket, count)?;
    }
    writeln!(out, "{}", RULE)?;
    writeln!(
        out,
        "Overruns ({}+): {}",
        report.histogram.capacity(),
        report.histogram.overflow()
    )?;
    if report.gated {
        writeln!(out, "Traced samples: {}", report.emitted)?;
    }
    Ok(())
}

fn format_file(report: &RunReport, out: &mut dyn Write) -> io::Result<()> {
    match report.duration {
        Some(d) => writeln!(
            out,
            "# Data generated by NPT for {} {}",
            format_g(d),
            report.unit.suffix()
        )?,
        None => writeln!(out, "# Data generated by NPT for {} cycles", report.loops)?,
    }
    writeln!(
        out,
        "# The time values are expressed in {}.",
        report.unit.suffix()
    )?;
    writeln!(out, "#")?;
    if let Some(s) = &report.statistics {
        writeln!(out, "#General statistics of cycles duration:")?;
        stat_lines(s, "#", "", out)?;
        writeln!(out, "#")?;
    }
    writeln!(
        out,
        "#\tOverruns ({}+): {}",
        report.histogram.capacity(),
        report.histogram.overflow()
    )?;
    writeln!(out, "#")?;
    writeln!(out, "#\ttime\tnb. cycles")?;
    writeln!(out, "#\t------------------")?;
    for (bucket, count) in report.histogram.iter() {
        writeln!(out, "\t{}\t{}", bucket, count)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::{CalibrationResult, CalibrationStrategy};
    use crate::config;
    use crate::convert::TimeUnit;
    use crate::histogram::Histogram;
    use crate::stats::OnlineStatistics;

    fn sample_report(durations: &[f64], gated: bool) -> RunReport {
        let mut stats = OnlineStatistics::new();
        let mut histogram = Histogram::new(10);
        for &d in durations {
            stats.update(d);
            histogram.record(d).unwrap();
        }
        RunReport {
            loops: durations.len() as u64 + 5,
            iterations: durations.len() as u64 + 5,
            warmup: 5,
            duration: None,
            statistics: stats.snapshot(),
            histogram,
            emitted: 2,
            gated,
            calibration: CalibrationResult::new(
                2_400_000_000,
                TimeUnit::Micro,
                CalibrationStrategy::Cpuinfo,
            )
            .unwrap(),
            unit: TimeUnit::Micro,
        }
    }

    fn console_to_string(report: &RunReport) -> String {
        let mut buf = Vec::new();
        format_console(report, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(4.0), "4");
        assert_eq!(format_g(0.25), "0.25");
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(0.0001234), "0.0001234");
        assert_eq!(format_g(0.00001234), "1.234e-05");
        assert_eq!(format_g(123456.0), "123456");
    }

    #[test]
    fn test_console_report() {
        let out = console_to_string(&sample_report(&[1.5, 2.5, 2.0, 12.0], false));
        assert!(out.starts_with("# CPU frequency (/proc/cpuinfo): 2400.00 MHz\n"));
        assert!(out.contains("4 cycles done over 4.\n"));
        assert!(out.contains("\tmin:\t\t1.500000 us\n"));
        assert!(out.contains("\tmax:\t\t12.000000 us\n"));
        assert!(out.contains("\tsum:\t\t18.000000 us\n"));
        assert!(out.contains("duration (us)\tnb. cycles\n"));
        assert!(out.contains("\n1\t\t1\n2\t\t2\n"));
        assert!(out.contains("Overruns (10+): 1\n"));
        assert!(!out.contains("Traced samples"));
    }

    #[test]
    fn test_console_report_gated() {
        let out = console_to_string(&sample_report(&[1.0], true));
        assert!(out.contains("Traced samples: 2\n"));
    }

    #[test]
    fn test_console_report_no_data() {
        let out = console_to_string(&sample_report(&[], false));
        assert!(out.contains("0 cycles done over 0.\n"));
        assert!(out.contains("Cycles duration: no data\n"));
    }

    #[test]
    fn test_file_report() {
        let mut buf = Vec::new();
        format_file(&sample_report(&[3.0, 3.5], false), &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("# Data generated by NPT for 7 cycles\n"));
        assert!(out.contains("# The time values are expressed in us.\n"));
        assert!(out.contains("#\tmean:\t\t3.250000\n"));
        assert!(out.ends_with("#\t------------------\n\t3\t2\n"));
    }

    #[test]
    fn test_reports_in_duration_mode() {
        let report = RunReport {
            loops: config::DEFAULT_LOOPS,
            duration: Some(6.5),
            ..sample_report(&[3.0, 3.5], false)
        };
        let out = console_to_string(&report);
        assert!(out.contains("2 cycles done in 6.5 us.\n"));
        assert!(!out.contains("done over"));

        let mut buf = Vec::new();
        format_file(&report, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.starts_with("# Data generated by NPT for 6.5 us\n"));
    }

    #[test]
    fn test_write_report_to_file() {
        let path = std::env::temp_dir().join("npt_test_report.txt");
        write_report(&sample_report(&[1.0, 2.0], false), Some(&path)).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\t1\t1\n\t2\t1\n"));
        let _ = std::fs::remove_file(&path);
    }
}
