//! CSV export for simulation step records.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::sim::types::StepRecord;

/// Column header of the step telemetry CSV.
const HEADER: &str = "step,time_h,pv_kw,base_load_kw,ecs_kw,battery_kw,\
                       grid_import_kw,grid_export_kw,import_price,export_price,\
                       pv_to_load_kwh,pv_to_ecs_kwh,pv_to_battery_kwh,pv_to_grid_kwh,\
                       battery_to_load_kwh,battery_to_ecs_kwh,grid_to_load_kwh,grid_to_ecs_kwh,\
                       battery_soc_pct,tank_temp_c,rescue_kwh";

/// Exports step records to a CSV file at the given path.
///
/// Writes a header row followed by one data row per step. Produces
/// deterministic output for identical inputs.
///
/// # Arguments
///
/// * `records` - Step records of a daily run, or of several days chained
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(records: &[StepRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(records, buf)
}

/// Writes step records as CSV to any writer.
///
/// The SOC column takes the first battery of the step, the temperature
/// column the first tank; both are empty when the device is absent.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[StepRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    wtr.write_record(HEADER.split(',').map(str::trim))?;

    for r in records {
        let soc = r.devices.iter().find_map(|d| d.state.soc_pct());
        let temp = r.devices.iter().find_map(|d| d.state.temperature_c());
        let f = &r.flows;
        wtr.write_record(&[
            r.step.to_string(),
            format!("{:.2}", r.time_h),
            format!("{:.4}", r.pv_kw),
            format!("{:.4}", r.base_load_kw),
            format!("{:.4}", r.ecs_kw),
            format!("{:.4}", r.battery_kw),
            format!("{:.4}", r.grid_import_kw),
            format!("{:.4}", r.grid_export_kw),
            format!("{:.4}", r.import_price),
            format!("{:.4}", r.export_price),
            format!("{:.6}", f.pv_to_load),
            format!("{:.6}", f.pv_to_ecs),
            format!("{:.6}", f.pv_to_battery),
            format!("{:.6}", f.pv_to_grid),
            format!("{:.6}", f.battery_to_load),
            format!("{:.6}", f.battery_to_ecs),
            format!("{:.6}", f.grid_to_load),
            format!("{:.6}", f.grid_to_ecs),
            soc.map(|v| format!("{v:.2}")).unwrap_or_default(),
            temp.map(|v| format!("{v:.2}")).unwrap_or_default(),
            format!("{:.6}", r.rescue_kwh),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::DeviceState;
    use crate::sim::flows::{NetPowers, reconstruct};
    use crate::sim::types::DeviceStep;

    fn make_record(t: usize) -> StepRecord {
        let net = NetPowers {
            pv_kw: 3.0,
            base_load_kw: 0.5,
            ecs_kw: 1.0,
            battery_kw: 1.0,
        };
        StepRecord {
            step: t,
            time_h: t as f64 * 0.25,
            pv_kw: net.pv_kw,
            base_load_kw: net.base_load_kw,
            ecs_kw: net.ecs_kw,
            battery_kw: net.battery_kw,
            pv_used_on_site_kw: 2.5,
            grid_import_kw: net.grid_import_kw(),
            grid_export_kw: net.grid_export_kw(),
            import_price: 0.25,
            export_price: 0.1,
            flows: reconstruct(&net, 0.25),
            devices: vec![
                DeviceStep {
                    device_id: "battery".to_string(),
                    power_kw: 1.0,
                    state: DeviceState::Battery {
                        soc: 0.5,
                        capacity_kwh: 10.0,
                    },
                },
                DeviceStep {
                    device_id: "ecs".to_string(),
                    power_kw: 1.0,
                    state: DeviceState::ThermalTank {
                        temperature_c: 48.5,
                        target_c: 55.0,
                    },
                },
            ],
            rescue_kwh: 0.0,
        }
    }

    #[test]
    fn header_lists_all_columns() {
        let mut buf = Vec::new();
        write_csv(&[make_record(0)], &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let first_line = output.lines().next().unwrap_or("");
        assert!(first_line.starts_with("step,time_h,pv_kw,base_load_kw,ecs_kw"));
        assert!(first_line.ends_with("battery_soc_pct,tank_temp_c,rescue_kwh"));
        assert_eq!(first_line.split(',').count(), 21);
    }

    #[test]
    fn row_count_matches_step_count() {
        let records: Vec<StepRecord> = (0..96).map(make_record).collect();
        let mut buf = Vec::new();
        write_csv(&records, &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        // 1 header + 96 data rows
        assert_eq!(output.lines().count(), 97);
    }

    #[test]
    fn rows_parse_back_as_numbers() {
        let records: Vec<StepRecord> = (0..3).map(make_record).collect();
        let mut buf = Vec::new();
        write_csv(&records, &mut buf).unwrap();

        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let mut rows = 0;
        for record in rdr.records() {
            let rec = record.unwrap();
            assert_eq!(rec.len(), 21);
            for field in rec.iter() {
                assert!(field.parse::<f64>().is_ok(), "{field} should parse");
            }
            assert_eq!(&rec[18], "50.00");
            assert_eq!(&rec[19], "48.50");
            rows += 1;
        }
        assert_eq!(rows, 3);
    }

    #[test]
    fn missing_devices_leave_empty_cells() {
        let mut record = make_record(0);
        record.devices.clear();
        let mut buf = Vec::new();
        write_csv(&[record], &mut buf).unwrap();
        let output = String::from_utf8(buf).unwrap();
        let row = output.lines().nth(1).unwrap_or("");
        assert!(row.ends_with(",,,0.000000"));
    }
}
