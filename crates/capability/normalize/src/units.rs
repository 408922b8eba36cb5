/// 单位归一化结果。
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConversion {
    /// 归一化后的单位
    pub unit: String,
    /// 原始单位 → 目标单位的乘数
    pub factor: f64,
}

/// 将文档中的单位归一化为标准工程单位。
///
/// 未登记的单位原样保留，系数为 1；空单位记为 `none`。
pub fn normalize_unit(unit: &str) -> UnitConversion {
    let unit = unit.trim();
    let (target, factor) = match unit {
        "" => ("none", 1.0),
        "mA" => ("A", 0.001),
        "W" => ("kW", 0.001),
        "var" | "VAr" => ("kVar", 0.001),
        "VA" => ("kVA", 0.001),
        "Wh" => ("kWh", 0.001),
        "varh" => ("kVarh", 0.001),
        "C" | "degC" => ("°C", 1.0),
        other => (other, 1.0),
    };
    UnitConversion {
        unit: target.to_string(),
        factor,
    }
}
