//! Komfovent 寄存器定义
//!
//! 寄存器编号沿用设备文档中的 1 基编号（逻辑编号），线上 Modbus 地址为 0 基：
//! `wire_address = register - 1`。
//!
//! 每个寄存器恰好属于一张位宽表：
//! - 16 位无符号
//! - 16 位有符号（补码）
//! - 32 位无符号（占用 `register` 与 `register + 1` 两个字，高字在前）
//!
//! 不在任何表中的寄存器视为未知，读写层必须拒绝，不能猜测位宽。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// 逻辑寄存器编号。
pub type RegisterId = u16;

/// 逻辑编号与线上地址的偏移量。
pub const REGISTER_ADDRESS_OFFSET: u16 = 1;

// 基本控制
pub const REG_POWER: RegisterId = 1;
pub const REG_AUTO_MODE_CONTROL: RegisterId = 2;
pub const REG_ECO_MODE: RegisterId = 3;
pub const REG_AUTO_MODE: RegisterId = 4;
pub const REG_OPERATION_MODE: RegisterId = 5;
pub const REG_SCHEDULER_MODE: RegisterId = 6;
pub const REG_NEXT_MODE: RegisterId = 7;
pub const REG_NEXT_MODE_TIME: RegisterId = 8;
pub const REG_NEXT_MODE_WEEKDAY: RegisterId = 9;
pub const REG_BEFORE_MODE_MASK: RegisterId = 10;

// 温度与风量控制
pub const REG_TEMP_CONTROL: RegisterId = 11;
pub const REG_FLOW_CONTROL: RegisterId = 12;
pub const REG_MAX_SUPPLY_FLOW: RegisterId = 13;
pub const REG_MAX_EXTRACT_FLOW: RegisterId = 15;
pub const REG_MAX_SUPPLY_PRESSURE: RegisterId = 17;
pub const REG_MAX_EXTRACT_PRESSURE: RegisterId = 18;

// 控制序列
pub const REG_STAGE1: RegisterId = 19;
pub const REG_STAGE2: RegisterId = 20;
pub const REG_STAGE3: RegisterId = 21;
pub const REG_COIL_TYPE: RegisterId = 22;

// 网络
pub const REG_IP: RegisterId = 23;
pub const REG_MASK: RegisterId = 25;

// 设置
pub const REG_LANGUAGE: RegisterId = 27;
pub const REG_FLOW_UNIT: RegisterId = 28;

// 时间与日期
pub const REG_TIME: RegisterId = 29;
pub const REG_YEAR: RegisterId = 30;
pub const REG_MONTH_DAY: RegisterId = 31;
pub const REG_WEEK_DAY: RegisterId = 32;
pub const REG_EPOCH_TIME: RegisterId = 33;

// 离家模式
pub const REG_AWAY_FAN_SUPPLY: RegisterId = 100;
pub const REG_AWAY_FAN_EXTRACT: RegisterId = 102;
pub const REG_AWAY_TEMP: RegisterId = 104;
pub const REG_AWAY_HEATING: RegisterId = 105;

// 常规模式
pub const REG_NORMAL_FAN_SUPPLY: RegisterId = 106;
pub const REG_NORMAL_FAN_EXTRACT: RegisterId = 108;
pub const REG_NORMAL_SETPOINT: RegisterId = 110;
pub const REG_NORMAL_HEATING: RegisterId = 111;

// 强化模式
pub const REG_INTENSIVE_FAN_SUPPLY: RegisterId = 112;
pub const REG_INTENSIVE_FAN_EXTRACT: RegisterId = 114;
pub const REG_INTENSIVE_TEMP: RegisterId = 116;
pub const REG_INTENSIVE_HEATING: RegisterId = 117;

// 增压模式
pub const REG_BOOST_FAN_SUPPLY: RegisterId = 118;
pub const REG_BOOST_FAN_EXTRACT: RegisterId = 120;
pub const REG_BOOST_TEMP: RegisterId = 122;
pub const REG_BOOST_HEATING: RegisterId = 123;

// 厨房模式
pub const REG_KITCHEN_SUPPLY: RegisterId = 124;
pub const REG_KITCHEN_EXTRACT: RegisterId = 126;
pub const REG_KITCHEN_TEMP: RegisterId = 128;
pub const REG_KITCHEN_HEATING: RegisterId = 129;
pub const REG_KITCHEN_TIMER: RegisterId = 130;

// 壁炉模式
pub const REG_FIREPLACE_SUPPLY: RegisterId = 131;
pub const REG_FIREPLACE_EXTRACT: RegisterId = 133;
pub const REG_FIREPLACE_TEMP: RegisterId = 135;
pub const REG_FIREPLACE_HEATING: RegisterId = 136;
pub const REG_FIREPLACE_TIMER: RegisterId = 137;

// 覆盖模式
pub const REG_OVERRIDE_SUPPLY: RegisterId = 138;
pub const REG_OVERRIDE_EXTRACT: RegisterId = 140;
pub const REG_OVERRIDE_TEMP: RegisterId = 142;
pub const REG_OVERRIDE_HEATING: RegisterId = 143;
pub const REG_OVERRIDE_MODE: RegisterId = 144;
pub const REG_OVERRIDE_TIMER: RegisterId = 145;

// 假期模式
pub const REG_HOLIDAYS_MICROVENT: RegisterId = 146;
pub const REG_HOLIDAYS_TEMP: RegisterId = 147;
pub const REG_HOLIDAYS_HEATING: RegisterId = 148;
pub const REG_HOLIDAYS_FROM: RegisterId = 149;
pub const REG_HOLIDAYS_TILL: RegisterId = 151;
pub const REG_HOLIDAYS_YEAR_FROM: RegisterId = 153;
pub const REG_HOLIDAYS_DATE_FROM: RegisterId = 154;
pub const REG_HOLIDAYS_YEAR_TILL: RegisterId = 155;
pub const REG_HOLIDAYS_DATE_TILL: RegisterId = 156;

// ECO 设置
pub const REG_ECO_MIN_TEMP: RegisterId = 200;
pub const REG_ECO_MAX_TEMP: RegisterId = 201;
pub const REG_FREE_HEATING: RegisterId = 202;
pub const REG_HEATING_DENIED: RegisterId = 203;
pub const REG_COOLING_DENIED: RegisterId = 204;

// 空气质量设置
pub const REG_AQ_IMPURITY_CONTROL: RegisterId = 205;
pub const REG_AQ_TEMP_SETPOINT: RegisterId = 206;
pub const REG_CO2_SETPOINT: RegisterId = 207;
pub const REG_HUMIDITY_SETPOINT: RegisterId = 208;
pub const REG_AQ_MIN_INTENSITY: RegisterId = 209;
pub const REG_AQ_MAX_INTENSITY: RegisterId = 210;
pub const REG_AQ_HEATING: RegisterId = 211;
pub const REG_AQ_CHECK_PERIOD: RegisterId = 212;
pub const REG_AQ_SENSOR1_TYPE: RegisterId = 213;
pub const REG_AQ_SENSOR2_TYPE: RegisterId = 214;
pub const REG_AQ_HUMIDITY_CONTROL: RegisterId = 215;
pub const REG_AQ_OUTDOOR_HUMIDITY: RegisterId = 216;

// 告警（向 600 写入 0x99C6 复位告警并恢复之前的模式）
pub const REG_ACTIVE_ALARMS_COUNT: RegisterId = 600;
pub const REG_ACTIVE_ALARM1: RegisterId = 601;
pub const REG_ACTIVE_ALARM2: RegisterId = 602;
pub const REG_ACTIVE_ALARM3: RegisterId = 603;
pub const REG_ACTIVE_ALARM4: RegisterId = 604;
pub const REG_ACTIVE_ALARM5: RegisterId = 605;
pub const REG_ACTIVE_ALARM6: RegisterId = 606;
pub const REG_ACTIVE_ALARM7: RegisterId = 607;
pub const REG_ACTIVE_ALARM8: RegisterId = 608;
pub const REG_ACTIVE_ALARM9: RegisterId = 609;
pub const REG_ACTIVE_ALARM10: RegisterId = 610;

// 传感器（温度为 x10 °C）
pub const REG_STATUS: RegisterId = 900;
pub const REG_HEATING_CONFIG: RegisterId = 901;
pub const REG_SUPPLY_TEMP: RegisterId = 902;
pub const REG_EXTRACT_TEMP: RegisterId = 903;
pub const REG_OUTDOOR_TEMP: RegisterId = 904;
pub const REG_WATER_TEMP: RegisterId = 905;
pub const REG_SUPPLY_FLOW: RegisterId = 906;
pub const REG_EXTRACT_FLOW: RegisterId = 908;
pub const REG_SUPPLY_FAN: RegisterId = 910;
pub const REG_EXTRACT_FAN: RegisterId = 911;
pub const REG_HEAT_EXCHANGER: RegisterId = 912;
pub const REG_ELECTRIC_HEATER: RegisterId = 913;
pub const REG_WATER_HEATER: RegisterId = 914;
pub const REG_WATER_COOLER: RegisterId = 915;
pub const REG_DX_UNIT: RegisterId = 916;
pub const REG_FILTER_IMPURITY: RegisterId = 917;
pub const REG_AIR_DAMPERS: RegisterId = 918;
pub const REG_SUPPLY_PRESSURE: RegisterId = 919;
pub const REG_EXTRACT_PRESSURE: RegisterId = 920;

// 能效
pub const REG_POWER_CONSUMPTION: RegisterId = 921;
pub const REG_HEATER_POWER: RegisterId = 922;
pub const REG_HEAT_RECOVERY: RegisterId = 923;
pub const REG_HEAT_EFFICIENCY: RegisterId = 924;
pub const REG_ENERGY_SAVING: RegisterId = 925;
pub const REG_SPI: RegisterId = 926;

// 能耗累计
pub const REG_AHU_DAY: RegisterId = 927;
pub const REG_AHU_MONTH: RegisterId = 929;
pub const REG_AHU_TOTAL: RegisterId = 931;
pub const REG_HEATER_DAY: RegisterId = 933;
pub const REG_HEATER_MONTH: RegisterId = 935;
pub const REG_HEATER_TOTAL: RegisterId = 937;
pub const REG_RECOVERY_DAY: RegisterId = 939;
pub const REG_RECOVERY_MONTH: RegisterId = 941;
pub const REG_RECOVERY_TOTAL: RegisterId = 943;
pub const REG_SPI_DAY: RegisterId = 945;

// 面板传感器
pub const REG_PANEL1_TEMP: RegisterId = 946;
pub const REG_PANEL1_RH: RegisterId = 947;
pub const REG_PANEL1_AQ: RegisterId = 948;
pub const REG_PANEL2_TEMP: RegisterId = 949;
pub const REG_PANEL2_RH: RegisterId = 950;
pub const REG_PANEL2_AQ: RegisterId = 951;
pub const REG_AQ_SENSOR1_VALUE: RegisterId = 952;
pub const REG_AQ_SENSOR2_VALUE: RegisterId = 953;
pub const REG_CONNECTED_PANELS: RegisterId = 954;
pub const REG_HEAT_EXCHANGER_TYPE: RegisterId = 955;
pub const REG_INDOOR_ABS_HUMIDITY: RegisterId = 956;

// 数字输出
pub const REG_DO_ALARM: RegisterId = 958;
pub const REG_DO_HEATING: RegisterId = 959;
pub const REG_DO_COOLING: RegisterId = 960;
pub const REG_EXHAUST_TEMP: RegisterId = 961;

// 固件版本
pub const REG_FIRMWARE: RegisterId = 1000;
pub const REG_PANEL1_FW: RegisterId = 1002;
pub const REG_PANEL2_FW: RegisterId = 1004;

// 复位
pub const REG_RESET_SETTINGS: RegisterId = 1050;
pub const REG_CLEAN_FILTERS: RegisterId = 1051;

/// 16 位无符号寄存器。
pub const REGISTERS_16BIT_UNSIGNED: &[RegisterId] = &[
    REG_POWER,
    REG_AUTO_MODE_CONTROL,
    REG_ECO_MODE,
    REG_AUTO_MODE,
    REG_OPERATION_MODE,
    REG_SCHEDULER_MODE,
    REG_NEXT_MODE,
    REG_NEXT_MODE_TIME,
    REG_NEXT_MODE_WEEKDAY,
    REG_BEFORE_MODE_MASK,
    REG_TEMP_CONTROL,
    REG_FLOW_CONTROL,
    REG_MAX_SUPPLY_PRESSURE,
    REG_MAX_EXTRACT_PRESSURE,
    REG_STAGE1,
    REG_STAGE2,
    REG_STAGE3,
    REG_COIL_TYPE,
    REG_LANGUAGE,
    REG_FLOW_UNIT,
    REG_TIME,
    REG_YEAR,
    REG_MONTH_DAY,
    REG_WEEK_DAY,
    REG_AWAY_HEATING,
    REG_NORMAL_HEATING,
    REG_INTENSIVE_HEATING,
    REG_BOOST_HEATING,
    REG_KITCHEN_HEATING,
    REG_KITCHEN_TIMER,
    REG_FIREPLACE_HEATING,
    REG_FIREPLACE_TIMER,
    REG_OVERRIDE_HEATING,
    REG_OVERRIDE_MODE,
    REG_OVERRIDE_TIMER,
    REG_HOLIDAYS_MICROVENT,
    REG_HOLIDAYS_HEATING,
    REG_HOLIDAYS_FROM,
    REG_HOLIDAYS_TILL,
    REG_HOLIDAYS_YEAR_FROM,
    REG_HOLIDAYS_DATE_FROM,
    REG_HOLIDAYS_YEAR_TILL,
    REG_HOLIDAYS_DATE_TILL,
    REG_ECO_MIN_TEMP,
    REG_ECO_MAX_TEMP,
    REG_FREE_HEATING,
    REG_HEATING_DENIED,
    REG_COOLING_DENIED,
    REG_AQ_IMPURITY_CONTROL,
    REG_CO2_SETPOINT,
    REG_HUMIDITY_SETPOINT,
    REG_AQ_MIN_INTENSITY,
    REG_AQ_MAX_INTENSITY,
    REG_AQ_HEATING,
    REG_AQ_CHECK_PERIOD,
    REG_AQ_SENSOR1_TYPE,
    REG_AQ_SENSOR2_TYPE,
    REG_AQ_HUMIDITY_CONTROL,
    REG_AQ_OUTDOOR_HUMIDITY,
    REG_ACTIVE_ALARMS_COUNT,
    REG_ACTIVE_ALARM1,
    REG_ACTIVE_ALARM2,
    REG_ACTIVE_ALARM3,
    REG_ACTIVE_ALARM4,
    REG_ACTIVE_ALARM5,
    REG_ACTIVE_ALARM6,
    REG_ACTIVE_ALARM7,
    REG_ACTIVE_ALARM8,
    REG_ACTIVE_ALARM9,
    REG_ACTIVE_ALARM10,
    REG_STATUS,
    REG_HEATING_CONFIG,
    REG_SUPPLY_FAN,
    REG_EXTRACT_FAN,
    REG_HEAT_EXCHANGER,
    REG_ELECTRIC_HEATER,
    REG_WATER_HEATER,
    REG_WATER_COOLER,
    REG_FILTER_IMPURITY,
    REG_AIR_DAMPERS,
    REG_SUPPLY_PRESSURE,
    REG_EXTRACT_PRESSURE,
    REG_POWER_CONSUMPTION,
    REG_HEATER_POWER,
    REG_HEAT_RECOVERY,
    REG_HEAT_EFFICIENCY,
    REG_ENERGY_SAVING,
    REG_SPI,
    REG_SPI_DAY,
    REG_PANEL1_AQ,
    REG_PANEL2_AQ,
    REG_AQ_SENSOR1_VALUE,
    REG_AQ_SENSOR2_VALUE,
    REG_CONNECTED_PANELS,
    REG_HEAT_EXCHANGER_TYPE,
    REG_INDOOR_ABS_HUMIDITY,
    REG_DO_ALARM,
    REG_DO_HEATING,
    REG_DO_COOLING,
    REG_RESET_SETTINGS,
    REG_CLEAN_FILTERS,
];

/// 16 位有符号寄存器。
pub const REGISTERS_16BIT_SIGNED: &[RegisterId] = &[
    REG_AWAY_TEMP,
    REG_NORMAL_SETPOINT,
    REG_INTENSIVE_TEMP,
    REG_BOOST_TEMP,
    REG_KITCHEN_TEMP,
    REG_FIREPLACE_TEMP,
    REG_OVERRIDE_TEMP,
    REG_HOLIDAYS_TEMP,
    REG_AQ_TEMP_SETPOINT,
    REG_SUPPLY_TEMP,
    REG_EXTRACT_TEMP,
    REG_OUTDOOR_TEMP,
    REG_WATER_TEMP,
    REG_DX_UNIT,
    REG_PANEL1_TEMP,
    REG_PANEL1_RH,
    REG_PANEL2_TEMP,
    REG_PANEL2_RH,
    REG_EXHAUST_TEMP,
];

/// 32 位无符号寄存器（高字在前）。
pub const REGISTERS_32BIT_UNSIGNED: &[RegisterId] = &[
    REG_MAX_SUPPLY_FLOW,
    REG_MAX_EXTRACT_FLOW,
    REG_IP,
    REG_MASK,
    REG_EPOCH_TIME,
    REG_AWAY_FAN_SUPPLY,
    REG_AWAY_FAN_EXTRACT,
    REG_NORMAL_FAN_SUPPLY,
    REG_NORMAL_FAN_EXTRACT,
    REG_INTENSIVE_FAN_SUPPLY,
    REG_INTENSIVE_FAN_EXTRACT,
    REG_BOOST_FAN_SUPPLY,
    REG_BOOST_FAN_EXTRACT,
    REG_KITCHEN_SUPPLY,
    REG_KITCHEN_EXTRACT,
    REG_FIREPLACE_SUPPLY,
    REG_FIREPLACE_EXTRACT,
    REG_OVERRIDE_SUPPLY,
    REG_OVERRIDE_EXTRACT,
    REG_SUPPLY_FLOW,
    REG_EXTRACT_FLOW,
    REG_AHU_DAY,
    REG_AHU_MONTH,
    REG_AHU_TOTAL,
    REG_HEATER_DAY,
    REG_HEATER_MONTH,
    REG_HEATER_TOTAL,
    REG_RECOVERY_DAY,
    REG_RECOVERY_MONTH,
    REG_RECOVERY_TOTAL,
    REG_FIRMWARE,
    REG_PANEL1_FW,
    REG_PANEL2_FW,
];

/// 寄存器位宽分类。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterWidth {
    /// 16 位无符号
    U16,
    /// 16 位有符号（补码）
    S16,
    /// 32 位无符号（2 个寄存器）
    U32,
}

impl RegisterWidth {
    /// 占用的 16 位字数量。
    pub fn word_count(self) -> u16 {
        match self {
            Self::U16 | Self::S16 => 1,
            Self::U32 => 2,
        }
    }

    /// 将线上字解码为原生整数。
    ///
    /// 字数量不足时返回 `None`。
    pub fn decode(self, words: &[u16]) -> Option<i64> {
        match self {
            Self::U16 => words.first().map(|word| i64::from(*word)),
            Self::S16 => words.first().map(|word| i64::from(*word as i16)),
            Self::U32 => match words {
                [high, low, ..] => Some(i64::from((u32::from(*high) << 16) | u32::from(*low))),
                _ => None,
            },
        }
    }

    /// 将原生整数编码为线上字；超出位宽范围时返回 `None`。
    pub fn encode(self, value: i64) -> Option<Vec<u16>> {
        match self {
            Self::U16 => u16::try_from(value).ok().map(|word| vec![word]),
            Self::S16 => i16::try_from(value).ok().map(|word| vec![word as u16]),
            Self::U32 => u32::try_from(value)
                .ok()
                .map(|value| vec![(value >> 16) as u16, (value & 0xFFFF) as u16]),
        }
    }
}

/// 寄存器表一致性错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterTableError {
    #[error("register {0} appears in more than one table")]
    Duplicate(RegisterId),
    #[error("low word {low} of 32-bit register {register} is classified")]
    LowWordClassified { register: RegisterId, low: RegisterId },
}

fn table() -> &'static HashMap<RegisterId, RegisterWidth> {
    static TABLE: OnceLock<HashMap<RegisterId, RegisterWidth>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        for (registers, width) in [
            (REGISTERS_16BIT_UNSIGNED, RegisterWidth::U16),
            (REGISTERS_16BIT_SIGNED, RegisterWidth::S16),
            (REGISTERS_32BIT_UNSIGNED, RegisterWidth::U32),
        ] {
            for register in registers {
                table.entry(*register).or_insert(width);
            }
        }
        table
    })
}

/// 查询寄存器位宽；`None` 表示未知寄存器。
pub fn classify(register: RegisterId) -> Option<RegisterWidth> {
    table().get(&register).copied()
}

/// 逻辑编号换算为线上 Modbus 地址。
pub fn wire_address(register: RegisterId) -> Option<u16> {
    register.checked_sub(REGISTER_ADDRESS_OFFSET)
}

/// 校验三张表互不相交，且 32 位寄存器的低字不在任何表中。
pub fn validate_tables() -> Result<(), RegisterTableError> {
    let mut seen = std::collections::HashSet::new();
    for register in REGISTERS_16BIT_UNSIGNED
        .iter()
        .chain(REGISTERS_16BIT_SIGNED)
        .chain(REGISTERS_32BIT_UNSIGNED)
    {
        if !seen.insert(*register) {
            return Err(RegisterTableError::Duplicate(*register));
        }
    }
    for register in REGISTERS_32BIT_UNSIGNED {
        let low = register + 1;
        if seen.contains(&low) {
            return Err(RegisterTableError::LowWordClassified {
                register: *register,
                low,
            });
        }
    }
    Ok(())
}
