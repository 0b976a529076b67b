//! The fixed VM API surface.
//!
//! Maps the C function names declared in `vm_api.h` to their single VM
//! instruction. The header itself is embedded so the compiler is
//! self-contained; it is prepended as the first translation unit whenever the
//! user does not list a `vm_api.h` of their own.

/// Embedded `vm_api.h`, processed as the first source unit by default.
pub static VM_API_HEADER: &str = include_str!("vm_api.h");

/// Pseudo-filename the embedded header is registered under.
pub const VM_API_FILENAME: &str = "vm_api.h";

/// C name to VM instruction, the complete script command set.
static VM_FUNCTION_INSTRS: [(&str, &str); 54] = [
    // Basic commands
    ("gpioSetMode", "MODES"),
    ("gpioGetMode", "MODEG"),
    ("gpioSetPullUpDown", "PUD"),
    ("gpioRead", "READ"),
    ("gpioWrite", "WRITE"),
    // PWM commands
    ("gpioPWM", "PWM"),
    ("gpioSetPWMfrequency", "PFS"),
    ("gpioSetPWMrange", "PRS"),
    ("gpioGetPWMdutycycle", "GDC"),
    ("gpioGetPWMfrequency", "PFG"),
    ("gpioGetPWMrange", "PRG"),
    ("gpioGetPWMrealRange", "PRRG"),
    // Servo commands
    ("gpioServo", "SERVO"),
    ("gpioGetServoPulsewidth", "GPW"),
    // Intermediate commands
    ("gpioTrigger", "TRIG"),
    ("gpioSetWatchdog", "WDOG"),
    ("gpioRead_Bits_0_31", "BR1"),
    ("gpioRead_Bits_32_53", "BR2"),
    ("gpioWrite_Bits_0_31_Clear", "BC1"),
    ("gpioWrite_Bits_32_53_Clear", "BC2"),
    ("gpioWrite_Bits_0_31_Set", "BS1"),
    ("gpioWrite_Bits_32_53_Set", "BS2"),
    // Advanced commands
    ("gpioNotifyOpen", "NO"),
    ("gpioNotifyClose", "NC"),
    ("gpioNotifyBegin", "NB"),
    ("gpioNotifyPause", "NP"),
    ("gpioHardwareClock", "HC"),
    ("gpioHardwarePWM", "HP"),
    ("gpioGlitchFilter", "FG"),
    ("gpioNoiseFilter", "FN"),
    ("gpioSetPad", "PADS"),
    ("gpioGetPad", "PADG"),
    // Event commands
    ("eventMonitor", "EVM"),
    ("eventTrigger", "EVT"),
    // I2C commands
    ("i2cOpen", "I2CO"),
    ("i2cClose", "I2CC"),
    ("i2cWriteQuick", "I2CWQ"),
    ("i2cReadByte", "I2CRS"),
    ("i2cWriteByte", "I2CWS"),
    ("i2cReadByteData", "I2CRB"),
    ("i2cWriteByteData", "I2CWB"),
    ("i2cReadWordData", "I2CRW"),
    ("i2cWriteWordData", "I2CWW"),
    ("i2cProcessCall", "I2CPC"),
    // Utility commands
    ("gpioHardwareRevision", "HWVER"),
    ("gpioDelay_us", "MICS"),
    ("gpioDelay_ms", "MILS"),
    ("gpioVersion", "PIGPV"),
    ("gpioTick", "TICK"),
    // Configuration commands
    ("gpioCfgGetInternals", "CGI"),
    ("gpioCfgSetInternals", "CSI"),
    // Script-exclusive commands
    ("gpioWait", "WAIT"),
    ("eventWait", "EVTWT"),
    ("exit", "HALT"),
];

/// Look up the VM instruction for a C function name.
pub fn vm_instruction(name: &str) -> Option<&'static str> {
    VM_FUNCTION_INSTRS
        .iter()
        .find(|(c_name, _)| *c_name == name)
        .map(|(_, instr)| *instr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_functions() {
        assert_eq!(vm_instruction("gpioRead"), Some("READ"));
        assert_eq!(vm_instruction("gpioSetMode"), Some("MODES"));
        assert_eq!(vm_instruction("exit"), Some("HALT"));
        assert_eq!(vm_instruction("i2cProcessCall"), Some("I2CPC"));
        assert_eq!(vm_instruction("notAFunction"), None);
    }

    #[test]
    fn test_header_declares_every_table_entry() {
        for (c_name, _) in &VM_FUNCTION_INSTRS {
            assert!(
                VM_API_HEADER.contains(c_name),
                "vm_api.h is missing {}",
                c_name
            );
        }
    }

    #[test]
    fn test_header_defines_mode_and_pud_constants() {
        for name in ["PI_INPUT", "PI_OUTPUT", "PI_ALT0", "PI_PUD_OFF", "PI_PUD_UP"] {
            assert!(VM_API_HEADER.contains(name), "vm_api.h is missing {}", name);
        }
    }
}
