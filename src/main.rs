use std::process::ExitCode;

fn main() -> ExitCode {
    match roughness_cal::app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("rcal: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
