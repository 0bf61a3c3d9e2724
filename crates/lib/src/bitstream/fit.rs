//! FIT descriptor for the composite configuration container.

/// Image source (`.its`) bundling the peripheral and core regions.
///
/// `config-1` loads only the peripheral region so the HPS can release its
/// I/O early; `config-2` loads the core region later.
pub fn render_its(periph: &str, core: &str) -> String {
  format!(
    r#"/dts-v1/;

/ {{
	description = "FIT image with FPGA bitstream";
	#address-cells = <1>;

	images {{
		fpga-periph-1 {{
			description = "FPGA peripheral bitstream";
			data = /incbin/("{periph}");
			type = "fpga";
			arch = "arm";
			compression = "none";
		}};

		fpga-core-1 {{
			description = "FPGA core bitstream";
			data = /incbin/("{core}");
			type = "fpga";
			arch = "arm";
			compression = "none";
		}};
	}};

	configurations {{
		default = "config-1";
		config-1 {{
			description = "Boot with FPGA early IO release config";
			fpga = "fpga-periph-1";
		}};

		config-2 {{
			description = "Boot with FPGA core config";
			fpga = "fpga-core-1";
		}};
	}};
}};
"#
  )
}
