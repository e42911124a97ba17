// Built-in emotion → scene table used before any mapping file is applied.

use crate::model::{EmotionMapping, TriggerCondition};

pub fn default_mappings() -> Vec<EmotionMapping> {
    vec![
        EmotionMapping::new("happy", "Happy Scene")
            .with_priority(8)
            .with_threshold(0.75)
            .with_timing(1.5, 3.0)
            .with_trigger(TriggerCondition::Confidence),
        EmotionMapping::new("sad", "Calm Scene")
            .with_priority(7)
            .with_threshold(0.7)
            .with_timing(2.0, 4.0)
            .with_trigger(TriggerCondition::Sustained),
        EmotionMapping::new("surprise", "Dynamic Scene")
            .with_priority(9)
            .with_threshold(0.8)
            .with_timing(1.0, 2.0)
            .with_trigger(TriggerCondition::Immediate),
        EmotionMapping::new("neutral", "Default Scene")
            .with_priority(5)
            .with_threshold(0.6)
            .with_timing(3.0, 5.0)
            .with_trigger(TriggerCondition::Sustained),
        EmotionMapping::new("angry", "Intense Scene")
            .with_priority(6)
            .with_threshold(0.75)
            .with_timing(1.5, 4.0)
            .with_trigger(TriggerCondition::Combined),
        EmotionMapping::new("fear", "Dramatic Scene")
            .with_priority(7)
            .with_threshold(0.7)
            .with_timing(2.0, 3.0)
            .with_trigger(TriggerCondition::Confidence),
        EmotionMapping::new("disgust", "Neutral Scene")
            .with_priority(4)
            .with_threshold(0.65)
            .with_timing(2.5, 6.0)
            .with_trigger(TriggerCondition::Sustained),
    ]
}
