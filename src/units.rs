use std::fmt::Display;

#[derive(Debug, Clone)]
pub struct UnknownUnitError {
    pub quantity: &'static str,
    pub unit: String
}

impl UnknownUnitError {
    fn new<S: ToString>(quantity: &'static str, unit: S) -> Self {
        Self { quantity, unit: unit.to_string() }
    }
}

impl Display for UnknownUnitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown {} unit '{}'", self.quantity, self.unit)
    }
}

impl std::error::Error for UnknownUnitError {}


/// Factor to multiply a dry mole fraction in `old_unit` by to get it in `new_unit`.
///
/// Model output usually comes as mol/mol (e.g. GEOS-Chem's `SpeciesConcVV_*`) while
/// retrievals are reported in ppm or ppb, so this is applied to every model profile
/// before the averaging kernel.
pub fn dmf_conv_factor(old_unit: &str, new_unit: &str) -> Result<f64, UnknownUnitError> {
    let fac1 = parts_to(old_unit)?;
    let fac2 = parts_to(new_unit)?;
    Ok(fac2 / fac1)
}

fn parts_to(dmf_unit: &str) -> Result<f64, UnknownUnitError> {
    match dmf_unit.trim() {
        "parts" | "1" | "mol/mol" | "mol mol-1" | "v/v" => Ok(1.0),
        "ppm" | "ppmv" => Ok(1e6),
        "ppb" | "ppbv" => Ok(1e9),
        "ppt" | "pptv" => Ok(1e12),
        _ => Err(UnknownUnitError::new("mole fraction", dmf_unit)),
    }
}

pub fn dmf_long_name(dmf_unit: &str) -> Result<&'static str, UnknownUnitError> {
    match dmf_unit.trim() {
        "parts" | "1" | "mol/mol" | "mol mol-1" | "v/v" => Ok("parts"),
        "ppm" | "ppmv" => Ok("parts per million"),
        "ppb" | "ppbv" => Ok("parts per billion"),
        "ppt" | "pptv" => Ok("parts per trillion"),
        _ => Err(UnknownUnitError::new("mole fraction", dmf_unit))
    }
}

/// Factor to multiply a pressure in `unit` by to get it in hPa.
pub fn pressure_to_hpa(unit: &str) -> Result<f64, UnknownUnitError> {
    match unit.trim() {
        "Pa" | "pa" => Ok(0.01),
        "hPa" | "hpa" | "mbar" | "mb" | "millibar" => Ok(1.0),
        "kPa" | "kpa" => Ok(10.0),
        "atm" => Ok(1013.25),
        _ => Err(UnknownUnitError::new("pressure", unit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dmf_conversion() {
        assert_relative_eq!(dmf_conv_factor("mol/mol", "ppb").unwrap(), 1e9);
        assert_relative_eq!(dmf_conv_factor("ppm", "ppb").unwrap(), 1e3);
        assert_relative_eq!(dmf_conv_factor("ppb", "ppm").unwrap(), 1e-3);
        assert_relative_eq!(dmf_conv_factor("ppb", "ppb").unwrap(), 1.0);
    }

    #[test]
    fn test_unknown_units() {
        let err = dmf_conv_factor("molec/cm2", "ppb").unwrap_err();
        assert_eq!(err.unit, "molec/cm2");
        assert_eq!(err.to_string(), "Unknown mole fraction unit 'molec/cm2'");
        assert!(pressure_to_hpa("psi").is_err());
    }

    #[test]
    fn test_pressure_conversion() {
        assert_relative_eq!(pressure_to_hpa("Pa").unwrap() * 101325.0, 1013.25);
        assert_relative_eq!(pressure_to_hpa("mbar").unwrap(), 1.0);
    }

    #[test]
    fn test_long_names() {
        assert_eq!(dmf_long_name("ppbv").unwrap(), "parts per billion");
        assert_eq!(dmf_long_name("mol/mol").unwrap(), "parts");
    }
}
