//! Fixed growth-stage label set and its agronomic descriptions.

use std::fmt;
use std::str::FromStr;

use crate::error::LookupMiss;

/// Phenological stage of a bean plant, as predicted by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrowthStage {
    V1,
    V2,
    V3,
    V4,
    R5,
    R6,
    R7,
    R8,
    R9,
}

impl GrowthStage {
    /// All stages in phenological order.
    pub const ALL: [GrowthStage; 9] = [
        GrowthStage::V1,
        GrowthStage::V2,
        GrowthStage::V3,
        GrowthStage::V4,
        GrowthStage::R5,
        GrowthStage::R6,
        GrowthStage::R7,
        GrowthStage::R8,
        GrowthStage::R9,
    ];

    pub fn code(self) -> &'static str {
        match self {
            GrowthStage::V1 => "V1",
            GrowthStage::V2 => "V2",
            GrowthStage::V3 => "V3",
            GrowthStage::V4 => "V4",
            GrowthStage::R5 => "R5",
            GrowthStage::R6 => "R6",
            GrowthStage::R7 => "R7",
            GrowthStage::R8 => "R8",
            GrowthStage::R9 => "R9",
        }
    }

    /// Metadata for this stage. Total over the enum.
    pub fn info(self) -> StageInfo {
        let (description, recommendations) = match self {
            GrowthStage::V1 => (
                "Emergencia del primer par de hojas unifoliadas completamente abiertas.",
                "Riego: Mantener humedad uniforme en el perfil de suelo para favorecer desarrollo radicular. \
                 Control de malezas: Paso temprano de escarda o herbicida residual selectivo. \
                 Salud de suelo: Revisar pH y enmendar con cal si sea necesario.",
            ),
            GrowthStage::V2 => (
                "Aparición del primer par de hojas trifoliadas completamente desarrolladas.",
                "Fertilización: Primera dosis de nitrógeno (si no hay buena inoculación bacteriana), monitorear fósforo y potasio. \
                 Monitoreo de plagas: Inspeccionar áfidos y trips; usar trampas cromáticas. \
                 Control de malezas tardías: Segundo pase de escarda o herbicida residual.",
            ),
            GrowthStage::V3 => (
                "Desarrollo del segundo par de hojas trifoliadas.",
                "Micronutrientes: Aplicación foliar ligera de zinc y boro si hay clorosis o necrosis. \
                 Salud foliar: Revisar síntomas de roya y manchas; fungicida preventivo si aparecen. \
                 Riego: Ajustar frecuencia según humedad del suelo para evitar estrés hídrico.",
            ),
            GrowthStage::V4 => (
                "Desarrollo del tercer par de hojas trifoliadas; la planta continúa acumulando biomasa.",
                "Dosel y densidad: Evaluar cobertura del suelo y considerar ajustes de densidad para el próximo ciclo. \
                 Control biológico: Fomentar insectos benéficos con bandas florales o refugios. \
                 Nutrición: Refuerzo de potasio para mejorar resistencia al estrés.",
            ),
            GrowthStage::R5 => (
                "Inicio de la floración; se observan las primeras flores abiertas.",
                "Riego crítico: Humedad constante durante floración para evitar caída de flores. \
                 Fungicidas: Aplicar mezcla de contacto + sistémico al inicio de floración. \
                 Insecticidas: Monitorear y controlar chinches de soya y mosquita blanca.",
            ),
            GrowthStage::R6 => (
                "Floración plena; la mayoría de las plantas tienen flores.",
                "Monitoreo climático: Refuerzo de fungicida en periodos lluviosos y riego de auxilio en calor extremo. \
                 Foliar: Aporte de calcio y magnesio para mejorar cuajado de vainas. \
                 Control integrado: Mantener trampas y seguimiento de plagas.",
            ),
            GrowthStage::R7 => (
                "Formación de vainas; las primeras vainas jóvenes son visibles.",
                "Fertilización de fondo: Si el análisis de tejido lo indica, aplicar fertilizante de liberación lenta. \
                 Riego de socorro: Mantener 60–70 % de capacidad de campo para proteger número de semillas. \
                 Inspección de frutos: Vigilar daños por trips y chinches.",
            ),
            GrowthStage::R8 => (
                "Llenado de vainas; las semillas dentro de las vainas comienzan a desarrollarse.",
                "Riego óptimo: Evitar déficit hídrico, etapa crítica para rendimiento. \
                 Enfermedades de vainas: Revisar antracnosis y aplicar fungicida si hay manchas. \
                 Nutrición final: Aporte foliar de potasio para mejorar transporte de fotosintatos.",
            ),
            GrowthStage::R9 => (
                "Madurez fisiológica; las semillas alcanzan su tamaño y peso máximo, y las vainas comienzan a secarse.",
                "Reducción de riego: Suspender cuando las vainas empiecen a secar para facilitar madurez. \
                 Cosecha: Vigilar humedad de grano (18–20 %) para programar fecha óptima. \
                 Prevención de pérdidas: Controlar roedores y aves durante madurez.",
            ),
        };
        StageInfo {
            description: description.to_string(),
            recommendations: Some(recommendations.to_string()),
        }
    }
}

impl fmt::Display for GrowthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for GrowthStage {
    type Err = LookupMiss;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        GrowthStage::ALL
            .into_iter()
            .find(|stage| stage.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| LookupMiss(s.to_string()))
    }
}

/// Human-readable text shown for a predicted label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInfo {
    pub description: String,
    /// Agronomic advice; absent for the "not found" sentinel.
    pub recommendations: Option<String>,
}

impl StageInfo {
    /// Sentinel returned for a label outside the fixed set.
    pub fn not_found(label: &str) -> Self {
        Self {
            description: format!("Descripción no encontrada para: {label}"),
            recommendations: None,
        }
    }

    pub fn recommendations_or_default(&self) -> &str {
        self.recommendations
            .as_deref()
            .unwrap_or("Sin recomendaciones.")
    }
}

/// Strict lookup: fails for labels outside the set.
pub fn lookup(label: &str) -> Result<StageInfo, LookupMiss> {
    label.parse::<GrowthStage>().map(GrowthStage::info)
}

/// Total lookup used by the UI; an unknown label yields the sentinel text
/// instead of an error so a result is never blank.
pub fn describe(label: &str) -> StageInfo {
    match lookup(label) {
        Ok(info) => info,
        Err(miss) => {
            tracing::warn!("{miss}");
            StageInfo::not_found(label)
        }
    }
}
