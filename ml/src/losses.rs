use ndarray::*;

use crate::{
    errors::{ModelError, ModelResult},
    ImagePrecision,
};

/// Row-wise softmax, shifted by the row maximum for numerical stability.
pub fn softmax(logits: &ArrayView2<ImagePrecision>) -> Array2<ImagePrecision> {
    let mut probs = logits.to_owned();
    for mut row in probs.outer_iter_mut() {
        let max = row.fold(ImagePrecision::NEG_INFINITY, |m, &a| m.max(a));
        row.mapv_inplace(|a| (a - max).exp());
        let sum = row.sum();
        row /= sum;
    }
    probs
}

fn check_labels(logits: &ArrayView2<ImagePrecision>, labels: &[usize]) -> ModelResult<()> {
    let (batch_size, num_classes) = logits.dim();
    if batch_size != labels.len() {
        return Err(ModelError::LabelCountError(batch_size, labels.len()));
    }
    if let Some(&label) = labels.iter().find(|&&l| l >= num_classes) {
        return Err(ModelError::LabelRangeError(label, num_classes));
    }
    Ok(())
}

/// Sparse categorical cross entropy on raw logits (batch, classes) and integer
/// labels. Returns the mean loss over the batch together with the gradient
/// w.r.t. the logits, (softmax - onehot) / batch size.
pub fn sparse_categorical_crossentropy(
    logits: &ArrayView2<ImagePrecision>,
    labels: &[usize],
) -> ModelResult<(ImagePrecision, Array2<ImagePrecision>)> {
    check_labels(logits, labels)?;
    let batch_size = labels.len() as ImagePrecision;

    let mut grad = softmax(logits);
    let mut loss = 0.;
    for (mut row, &label) in grad.outer_iter_mut().zip(labels) {
        // clamp like keras does before taking the log
        loss -= row[label].max(1e-7).ln();
        row[label] -= 1.;
    }
    grad /= batch_size;
    Ok((loss / batch_size, grad))
}

/// Index of the largest logit per row.
pub fn argmax(logits: &ArrayView2<ImagePrecision>) -> Vec<usize> {
    logits
        .outer_iter()
        .map(|row| {
            row.indexed_iter()
                .fold((0, ImagePrecision::NEG_INFINITY), |best, (i, &a)| {
                    if a > best.1 {
                        (i, a)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

/// Fraction of rows whose largest logit is the label.
pub fn accuracy(logits: &ArrayView2<ImagePrecision>, labels: &[usize]) -> ModelResult<f32> {
    check_labels(logits, labels)?;
    if labels.is_empty() {
        return Ok(0.);
    }
    let correct = argmax(logits)
        .iter()
        .zip(labels)
        .filter(|(p, l)| p == l)
        .count();
    Ok(correct as f32 / labels.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_logits() {
        let logits = Array2::<f32>::zeros((2, 4));
        let (loss, grad) = sparse_categorical_crossentropy(&logits.view(), &[0, 3]).unwrap();

        assert!((loss - 4f32.ln()).abs() < 1e-6);
        for row in grad.outer_iter() {
            assert!(row.sum().abs() < 1e-6);
        }
        assert!((grad[[0, 0]] - (0.25 - 1.) / 2.).abs() < 1e-6);
        assert!((grad[[1, 1]] - 0.25 / 2.).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_is_shift_invariant() {
        let a = array![[1., 2., 3.]];
        let b = array![[1001., 1002., 1003.]];
        let pa = softmax(&a.view());
        let pb = softmax(&b.view());
        for (x, y) in pa.iter().zip(pb.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
        assert!((pa.sum() - 1.).abs() < 1e-6);
    }

    #[test]
    fn test_label_errors() {
        let logits = Array2::<f32>::zeros((2, 3));
        assert!(matches!(
            sparse_categorical_crossentropy(&logits.view(), &[0]),
            Err(ModelError::LabelCountError(2, 1))
        ));
        assert!(matches!(
            sparse_categorical_crossentropy(&logits.view(), &[0, 3]),
            Err(ModelError::LabelRangeError(3, 3))
        ));
    }

    #[test]
    fn test_accuracy() {
        let logits = array![[0.1, 0.9], [2., -1.], [0., 5.]];
        assert_eq!(argmax(&logits.view()), vec![1, 0, 1]);
        let acc = accuracy(&logits.view(), &[1, 1, 1]).unwrap();
        assert!((acc - 2. / 3.).abs() < 1e-6);
    }
}
